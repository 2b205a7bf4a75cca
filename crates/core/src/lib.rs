pub mod acquirer;
pub mod captcha;
pub mod circuit;
pub mod config;
pub mod control;
pub mod controller;
pub mod errors;
pub mod fetch_head;
pub mod frontend;
pub mod landing;
pub mod linkcache;
pub mod logging;
pub mod part;
pub mod queue;
pub mod sanitize;
pub mod segfile;
pub mod workers;

pub use controller::{DownloadOptions, Downloader};
pub use errors::{DownloadError, Result};
