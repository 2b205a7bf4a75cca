//! Link acquirer (C4): drives the circuit client and CAPTCHA solver to
//! produce a steady stream of valid download URLs into the URL queue.

mod classify;
mod form;
pub mod stats;

pub use classify::{classify_response, Classification};
pub use stats::{Statistics, StatisticsSnapshot};

use crate::captcha::CaptchaSolver;
use crate::circuit::{CircuitClient, CircuitSupervisor};
use crate::control::CancelToken;
use crate::landing::LandingInfo;
use crate::linkcache::LinkCache;
use crate::queue::UrlQueue;
use anyhow::{Context, Result};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Consecutive direct-slow failures before falling back to CAPTCHA mode,
/// carried over from the reference implementation's degrade policy.
const DIRECT_DOWNLOAD_FAILURE_THRESHOLD: u32 = 3;

enum Mode {
    DirectSlow(String),
    Captcha(String),
}

pub struct LinkAcquirer<S: CircuitSupervisor> {
    landing: LandingInfo,
    solver: Arc<dyn CaptchaSolver>,
    cache: LinkCache,
    circuit: CircuitClient<S>,
    cancel: CancelToken,
    stats: Arc<Statistics>,
    target_parts: usize,
    already_downloaded: usize,
}

impl<S: CircuitSupervisor> LinkAcquirer<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        landing: LandingInfo,
        solver: Arc<dyn CaptchaSolver>,
        cache: LinkCache,
        circuit: CircuitClient<S>,
        cancel: CancelToken,
        stats: Arc<Statistics>,
        target_parts: usize,
        already_downloaded: usize,
    ) -> Self {
        Self {
            landing,
            solver,
            cache,
            circuit,
            cancel,
            stats,
            target_parts,
            already_downloaded,
        }
    }

    pub fn stats(&self) -> Arc<Statistics> {
        Arc::clone(&self.stats)
    }

    /// Drains the link cache into `queue` first, then drives circuit
    /// rotation + CAPTCHA/direct-slow acquisition until enough URLs have
    /// been produced or cancellation is observed.
    pub fn run(&mut self, queue: &UrlQueue) -> Result<()> {
        let mut produced = 0usize;

        for url in self.cache.get_all_valid().context("reading link cache")? {
            queue.put(url);
            produced += 1;
        }

        let mut mode = if let Some(url) = &self.landing.slow_direct_url {
            Mode::DirectSlow(url.clone())
        } else if let Some(url) = &self.landing.captcha_url {
            Mode::Captcha(url.clone())
        } else {
            return Ok(());
        };

        let mut consecutive_direct_failures = 0u32;
        // Gates `new_identity()` before the next attempt; stays false after a
        // `BadCaptcha` outcome so a wrong answer retries from the same IP.
        let mut rotate_next = false;

        while produced + self.already_downloaded < self.target_parts && !self.cancel.is_cancelled() {
            self.circuit.ensure_running().context("circuit startup failed")?;
            if rotate_next {
                self.circuit.new_identity().context("circuit rotation failed")?;
            }

            if let Some(disclaimer) = self.landing.disclaimer_url.as_ref() {
                let _ = self.post_disclaimer(disclaimer);
            }

            self.stats.incr_all();
            let outcome = match &mode {
                Mode::DirectSlow(url) => self.attempt_direct(url),
                Mode::Captcha(url) => self.attempt_captcha(url),
            };

            rotate_next = !matches!(outcome, Ok(Classification::BadCaptcha));

            match outcome {
                Ok(Classification::Success { download_url }) => {
                    self.stats.incr_ok();
                    self.cache.append(&download_url).ok();
                    queue.put(download_url);
                    produced += 1;
                    consecutive_direct_failures = 0;
                }
                Ok(Classification::Limited) => {
                    self.stats.incr_limited();
                    consecutive_direct_failures += 1;
                }
                Ok(Classification::Blocked) => {
                    self.stats.incr_blocked();
                    consecutive_direct_failures += 1;
                }
                Ok(Classification::BadCaptcha) => {
                    self.stats.incr_bad();
                    // Same IP, retry: `rotate_next` was just set to false above.
                }
                Ok(Classification::Net) | Err(_) => {
                    self.stats.incr_net();
                    consecutive_direct_failures += 1;
                }
            }

            if let Mode::DirectSlow(_) = mode {
                if consecutive_direct_failures >= DIRECT_DOWNLOAD_FAILURE_THRESHOLD {
                    if let Some(captcha_url) = &self.landing.captcha_url {
                        tracing::info!("direct-slow degraded after repeated failures, switching to captcha");
                        mode = Mode::Captcha(captcha_url.clone());
                        consecutive_direct_failures = 0;
                    }
                }
            }
        }

        Ok(())
    }

    fn post_disclaimer(&self, url: &str) -> Result<()> {
        let mut easy = self.circuit.proxied_handle()?;
        easy.url(url)?;
        easy.post(true)?;
        easy.post_fields_copy(b"disclaimer=1")?;
        let mut sink = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|d| {
                sink.extend_from_slice(d);
                Ok(d.len())
            })?;
            transfer.perform()?;
        }
        Ok(())
    }

    fn attempt_direct(&self, url: &str) -> Result<Classification> {
        let (_, body) = self.get(url)?;
        Ok(classify_response(&body))
    }

    fn attempt_captcha(&self, challenge_url: &str) -> Result<Classification> {
        let (_, challenge_body) = self.get(challenge_url)?;
        let form = form::parse_captcha_form(&challenge_body)
            .context("captcha challenge page missing expected fields")?;

        if self.solver.cannot_solve() {
            anyhow::bail!("captcha required but no solver is configured");
        }
        let answer = self.solver.solve(&form.image_url, &self.cancel)?;

        let fields = form.answer_fields(&answer);
        let (_, body) = self.post_form(challenge_url, &fields)?;
        Ok(classify_response(&body))
    }

    fn get(&self, url: &str) -> Result<(u32, String)> {
        let mut easy = self.circuit.proxied_handle()?;
        easy.url(url)?;
        let mut list = curl::easy::List::new();
        list.append("X-Requested-With: XMLHttpRequest")?;
        list.append("Accept-Encoding: gzip")?;
        easy.http_headers(list)?;
        let mut sink = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|d| {
                sink.extend_from_slice(d);
                Ok(d.len())
            })?;
            transfer.perform()?;
        }
        let code = easy.response_code()?;
        let body = decode_body(&sink);
        Ok((code, body))
    }

    fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<(u32, String)> {
        let mut easy = self.circuit.proxied_handle()?;
        easy.url(url)?;
        let encoded = form::urlencode_fields(fields);
        easy.post(true)?;
        easy.post_fields_copy(encoded.as_bytes())?;
        let mut list = curl::easy::List::new();
        list.append("Content-Type: application/x-www-form-urlencoded")?;
        list.append("X-Requested-With: XMLHttpRequest")?;
        easy.http_headers(list)?;
        let mut sink = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|d| {
                sink.extend_from_slice(d);
                Ok(d.len())
            })?;
            transfer.perform()?;
        }
        let code = easy.response_code()?;
        let body = decode_body(&sink);
        Ok((code, body))
    }
}

fn decode_body(bytes: &[u8]) -> String {
    let mut s = String::new();
    let mut cursor = bytes;
    if cursor.read_to_string(&mut s).is_ok() {
        s
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
