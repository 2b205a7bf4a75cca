//! Error taxonomy for the download pipeline.
//!
//! Transient classes (transport, rate limit, captcha rejection) are handled
//! locally by the acquirer and worker pool and never reach the caller.
//! Fatal classes propagate out of [`crate::controller::Downloader::download`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not parse landing page: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited")]
    RateLimit,

    #[error("captcha rejected")]
    CaptchaRejected,

    #[error("captcha solver could not produce an answer")]
    Solver(String),

    #[error("download cancelled")]
    Cancelled,
}

impl From<curl::Error> for DownloadError {
    fn from(e: curl::Error) -> Self {
        DownloadError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
