//! Pluggable CAPTCHA solver. The core only depends on this capability; it
//! never implements image recognition itself.

use crate::control::CancelToken;
use anyhow::Result;

pub trait CaptchaSolver: Send + Sync {
    /// Attempts to solve the CAPTCHA at `image_url`, returning the answer
    /// text to submit. Should return promptly once `cancel` is observed.
    fn solve(&self, image_url: &str, cancel: &CancelToken) -> Result<String>;

    /// True if this solver can never produce an answer (e.g. no solver was
    /// configured). The controller aborts a CAPTCHA-required download
    /// rather than calling `solve` on such a solver.
    fn cannot_solve(&self) -> bool {
        false
    }
}

/// No-op solver: reports it cannot solve. Used when neither `--auto-captcha`
/// nor `--manual-captcha` is given but the landing page requires one.
pub struct NoSolver;

impl CaptchaSolver for NoSolver {
    fn solve(&self, _image_url: &str, _cancel: &CancelToken) -> Result<String> {
        anyhow::bail!("no captcha solver configured")
    }

    fn cannot_solve(&self) -> bool {
        true
    }
}

/// Prompts a human for the answer via an injected prompt function (the
/// frontend's interactive prompt capability), polling `cancel` so a
/// background download thread can be interrupted while waiting on input.
pub struct ManualSolver<F: Fn(&str) -> Result<String> + Send + Sync> {
    prompt: F,
}

impl<F: Fn(&str) -> Result<String> + Send + Sync> ManualSolver<F> {
    pub fn new(prompt: F) -> Self {
        Self { prompt }
    }
}

impl<F: Fn(&str) -> Result<String> + Send + Sync> CaptchaSolver for ManualSolver<F> {
    fn solve(&self, image_url: &str, _cancel: &CancelToken) -> Result<String> {
        (self.prompt)(image_url)
    }
}
