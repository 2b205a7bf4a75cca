//! Cooperative cancellation for a single in-flight download.
//!
//! A `CancelToken` is created by the controller, cloned into every part
//! worker, the link acquirer, and the frontend observer, and flipped once
//! from a signal handler or a fatal error. Everyone else only ever reads it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error surfaced when a download stops because it was cancelled, rather
/// than because of a genuine failure.
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "download cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Shared cancel flag for one download. Cheap to clone; all clones observe
/// the same underlying flag.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
