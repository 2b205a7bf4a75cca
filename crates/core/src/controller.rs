//! Downloader controller (C7): parses the landing page, sizes the file,
//! spawns the link acquirer and part workers, and tears everything down in
//! the order that keeps final numbers visible and leaves no orphaned
//! circuit subprocess.

use crate::acquirer::{LinkAcquirer, Statistics, StatisticsSnapshot};
use crate::captcha::CaptchaSolver;
use crate::circuit::{CircuitClient, CircuitSupervisor};
use crate::control::CancelToken;
use crate::fetch_head;
use crate::frontend::Frontend;
use crate::landing::PageParser;
use crate::linkcache::LinkCache;
use crate::part::DownloadPart;
use crate::queue::{TakeResult, UrlQueue};
use crate::segfile::SegFileStore;
use crate::workers::run_part_worker;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct DownloadOptions {
    pub parts: usize,
    pub output: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub overwrite: bool,
    pub conn_timeout: Duration,
    /// Routes the landing-page request (and password unlock, if any) through
    /// a circuit too. Link acquisition is always circuited regardless; the
    /// segment transfer itself never is.
    pub enforce_anon: bool,
    pub password: Option<String>,
    pub safety_margin_secs: i64,
    pub auto_delete: bool,
}

pub struct Downloader<S: CircuitSupervisor + 'static> {
    parser: Box<dyn PageParser>,
    solver: Arc<dyn CaptchaSolver>,
    frontend: Arc<dyn Frontend>,
    circuit_factory: Box<dyn Fn() -> S>,
}

impl<S: CircuitSupervisor + 'static> Downloader<S> {
    pub fn new(
        parser: Box<dyn PageParser>,
        solver: Arc<dyn CaptchaSolver>,
        frontend: Arc<dyn Frontend>,
        circuit_factory: Box<dyn Fn() -> S>,
    ) -> Self {
        Self {
            parser,
            solver,
            frontend,
            circuit_factory,
        }
    }

    pub fn download(&self, page_url: &str, opts: DownloadOptions) -> Result<()> {
        let cancel = CancelToken::new();
        let result = self.download_inner(page_url, &opts, &cancel);
        let (success, message) = match &result {
            Ok(()) => (true, "download complete".to_string()),
            Err(e) => (false, format!("{e:#}")),
        };
        self.frontend.finished(success, &message);
        result
    }

    fn download_inner(&self, page_url: &str, opts: &DownloadOptions, cancel: &CancelToken) -> Result<()> {
        // `--enforce-anon` additionally routes the landing-page request (and
        // any password unlock) through a circuit; the acquirer always does
        // regardless, and the segment transfer itself never does.
        let mut landing_circuit = if opts.enforce_anon {
            let mut cc = CircuitClient::new((self.circuit_factory)(), opts.conn_timeout);
            cc.ensure_running()
                .context("circuit startup failed for landing request")?;
            Some(cc)
        } else {
            None
        };

        // Some tracking-link paths 302 to the canonical page before exposing
        // any download markup; resolve through to the final URL so relative
        // hrefs on the landing page absolutize against the right base.
        let (html, resolved_url) = match &landing_circuit {
            Some(cc) => fetch_via_circuit(cc, page_url)?,
            None => fetch_plain(page_url, opts.conn_timeout)?,
        };
        let mut landing = self.parser.parse(&html, &resolved_url)?;

        if let Some(password) = &opts.password {
            if let Some(unlocked) = self.maybe_unlock_password(
                &resolved_url,
                &html,
                password,
                opts.conn_timeout,
                landing_circuit.as_mut(),
            )? {
                landing = unlocked;
            }
        }
        if let Some(cc) = &mut landing_circuit {
            cc.stop();
        }

        let filename = landing.filename.clone();
        let output_path = resolve_output_path(opts.output.as_deref(), &filename)?;
        let journal_path = opts.temp_dir.join(format!("{filename}.udown"));
        let cache_path = opts.temp_dir.join(format!("{filename}.ucache"));

        if output_path.exists() && !journal_path.exists() {
            let allowed = opts.overwrite
                || self.frontend.confirm(
                    &format!("{} already exists, overwrite?", output_path.display()),
                    false,
                );
            if !allowed {
                bail!("refusing to overwrite existing file without confirmation");
            }
        }

        let queue = UrlQueue::new();
        let (initial_url, parts, acquirer_handle, stats) = if let Some(quick) =
            landing.quick_download_url.clone()
        {
            (quick, 1usize, None, None)
        } else {
            let stats = Arc::new(Statistics::default());
            let cache = LinkCache::new(&cache_path, opts.safety_margin_secs);
            let circuit = CircuitClient::new((self.circuit_factory)(), opts.conn_timeout);
            let acquirer_cancel = CancelToken::new();
            let mut acquirer = LinkAcquirer::new(
                landing.clone(),
                Arc::clone(&self.solver),
                cache,
                circuit,
                acquirer_cancel.clone(),
                Arc::clone(&stats),
                opts.parts.max(1),
                0,
            );
            let queue_for_acquirer = queue.clone();
            let handle = std::thread::spawn(move || acquirer.run(&queue_for_acquirer));

            let first = loop {
                if cancel.is_cancelled() {
                    acquirer_cancel.cancel();
                    let _ = handle.join();
                    bail!("cancelled before first link was acquired");
                }
                match queue.take_timeout(Duration::from_millis(500)) {
                    TakeResult::Url(u) => break u,
                    TakeResult::Closed => bail!("link acquirer stopped without producing a URL"),
                    TakeResult::TimedOut => continue,
                }
            };

            (
                first,
                opts.parts.max(1),
                Some((handle, acquirer_cancel)),
                Some(stats),
            )
        };

        let head = fetch_head::probe(&initial_url, &HashMap::new())
            .context("HEAD probe on acquired download URL failed")?;
        let total_size = head
            .content_length
            .context("server did not report Content-Length")?;

        let store = SegFileStore::open_or_create(&output_path, &journal_path, total_size, parts)?;

        let mut download_parts = Vec::with_capacity(store.segments.len());
        let mut already_downloaded = 0usize;
        for (i, seg) in store.segments.iter().enumerate() {
            let cur = store.journal.read_cur(i)?;
            let bytes_already = cur.saturating_sub(seg.start);
            if bytes_already >= seg.len() {
                already_downloaded += 1;
            }
            download_parts.push(Arc::new(DownloadPart::new(i, seg.start, seg.end, bytes_already)));
        }
        tracing::debug!(already_downloaded, total = store.segments.len(), "resume state");

        let observer = spawn_frontend_observer(
            Arc::clone(&self.frontend),
            download_parts.clone(),
            stats.clone(),
        );

        let mut worker_handles = Vec::new();
        let mut initial_url_spent = false;
        for (i, part) in download_parts.iter().enumerate() {
            if part.is_complete() {
                continue;
            }
            let writer = store.writer_for(i)?;
            let part = Arc::clone(part);
            let cancel = cancel.clone();
            let queue = queue.clone();
            let conn_timeout = opts.conn_timeout;
            let url_override = if !initial_url_spent {
                initial_url_spent = true;
                Some(initial_url.clone())
            } else {
                None
            };

            let part_for_join = Arc::clone(&part);
            let handle = std::thread::spawn(move || -> Result<()> {
                let url = match url_override {
                    Some(u) => u,
                    None => loop {
                        if cancel.is_cancelled() {
                            let msg = "cancelled before a download URL became available";
                            part.mark_error(msg);
                            bail!(msg);
                        }
                        match queue.take_timeout(Duration::from_millis(500)) {
                            TakeResult::Url(u) => break u,
                            TakeResult::Closed => {
                                let msg = "link queue closed before a URL became available";
                                part.mark_error(msg);
                                bail!(msg);
                            }
                            TakeResult::TimedOut => continue,
                        }
                    },
                };
                run_part_worker(&part, writer, url, &queue, &cancel, conn_timeout)
            });
            worker_handles.push((part_for_join, handle));
        }

        if let Some((_, acquirer_cancel)) = &acquirer_handle {
            acquirer_cancel.cancel();
        }

        let mut all_ok = true;
        for (part, h) in worker_handles {
            match h.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("segment worker failed: {e:#}");
                    part.mark_error(e.to_string());
                    all_ok = false;
                    cancel.cancel();
                }
                Err(_) => {
                    part.mark_error("worker thread panicked");
                    all_ok = false;
                    cancel.cancel();
                }
            }
        }

        if let Some((handle, _)) = acquirer_handle {
            let _ = handle.join();
        }

        observer.stop();
        let _ = observer.join();

        if !all_ok {
            bail!("one or more segments failed; resume by re-running the same command");
        }

        std::fs::remove_file(&journal_path).ok();
        if opts.auto_delete {
            std::fs::remove_file(&cache_path).ok();
        }

        Ok(())
    }

    fn maybe_unlock_password(
        &self,
        page_url: &str,
        html: &str,
        password: &str,
        conn_timeout: Duration,
        circuit: Option<&mut CircuitClient<S>>,
    ) -> Result<Option<crate::landing::LandingInfo>> {
        if !html.contains("password") {
            return Ok(None);
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("password", password)
            .finish();
        let body = match circuit {
            Some(cc) => post_via_circuit(cc, page_url, &encoded)?,
            None => post_plain(page_url, &encoded, conn_timeout)?,
        };
        Ok(Some(self.parser.parse(&body, page_url)?))
    }
}

fn resolve_output_path(output: Option<&Path>, filename: &str) -> Result<PathBuf> {
    match output {
        None => Ok(PathBuf::from(filename)),
        Some(p) if p.is_dir() => Ok(p.join(filename)),
        Some(p) => Ok(p.to_path_buf()),
    }
}

fn fetch_plain(url: &str, conn_timeout: Duration) -> Result<(String, String)> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(conn_timeout)?;
    easy.timeout(conn_timeout)?;
    let mut sink = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|d| {
            sink.extend_from_slice(d);
            Ok(d.len())
        })?;
        transfer.perform().context("GET on landing page failed")?;
    }
    let effective = easy.effective_url()?.map(str::to_string).unwrap_or_else(|| url.to_string());
    Ok((String::from_utf8_lossy(&sink).into_owned(), effective))
}

fn fetch_via_circuit<S: CircuitSupervisor>(
    circuit: &CircuitClient<S>,
    url: &str,
) -> Result<(String, String)> {
    let mut easy = circuit.proxied_handle()?;
    easy.url(url)?;
    easy.follow_location(true)?;
    let mut sink = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|d| {
            sink.extend_from_slice(d);
            Ok(d.len())
        })?;
        transfer
            .perform()
            .context("circuited GET on landing page failed")?;
    }
    let effective = easy.effective_url()?.map(str::to_string).unwrap_or_else(|| url.to_string());
    Ok((String::from_utf8_lossy(&sink).into_owned(), effective))
}

fn post_via_circuit<S: CircuitSupervisor>(
    circuit: &CircuitClient<S>,
    url: &str,
    body: &str,
) -> Result<String> {
    let mut easy = circuit.proxied_handle()?;
    easy.url(url)?;
    easy.post(true)?;
    easy.post_fields_copy(body.as_bytes())?;
    let mut sink = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|d| {
            sink.extend_from_slice(d);
            Ok(d.len())
        })?;
        transfer
            .perform()
            .context("circuited POST to landing page failed")?;
    }
    Ok(String::from_utf8_lossy(&sink).into_owned())
}

fn post_plain(url: &str, body: &str, conn_timeout: Duration) -> Result<String> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.post(true)?;
    easy.post_fields_copy(body.as_bytes())?;
    easy.connect_timeout(conn_timeout)?;
    easy.timeout(conn_timeout)?;
    let mut sink = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|d| {
            sink.extend_from_slice(d);
            Ok(d.len())
        })?;
        transfer.perform().context("POST to landing page failed")?;
    }
    Ok(String::from_utf8_lossy(&sink).into_owned())
}

struct ObserverHandle {
    cancel: CancelToken,
    join: Option<std::thread::JoinHandle<()>>,
}

impl ObserverHandle {
    fn stop(&self) {
        self.cancel.cancel();
    }

    fn join(mut self) -> std::thread::Result<()> {
        self.join.take().unwrap().join()
    }
}

fn spawn_frontend_observer(
    frontend: Arc<dyn Frontend>,
    parts: Vec<Arc<DownloadPart>>,
    stats: Option<Arc<Statistics>>,
) -> ObserverHandle {
    let stop = CancelToken::new();
    let stop_for_thread = stop.clone();
    let join = std::thread::spawn(move || {
        while !stop_for_thread.is_cancelled() {
            let snapshots: Vec<_> = parts.iter().map(|p| p.snapshot()).collect();
            let stats_snapshot = stats
                .as_ref()
                .map(|s| s.snapshot())
                .unwrap_or(StatisticsSnapshot::default());
            frontend.observe(&snapshots, stats_snapshot);
            std::thread::sleep(Duration::from_millis(500));
        }
    });
    ObserverHandle {
        cancel: stop,
        join: Some(join),
    }
}
