//! URL queue (C5): bounded mailbox between the link acquirer/recycling
//! workers (producers) and the part worker pool (consumers).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Inner {
    urls: VecDeque<String>,
    closed: bool,
}

/// Clone-able handle; all clones share the same underlying queue.
#[derive(Clone)]
pub struct UrlQueue {
    inner: Arc<(Mutex<Inner>, Condvar)>,
}

impl UrlQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Inner {
                    urls: VecDeque::new(),
                    closed: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Non-blocking; wakes one waiting consumer.
    pub fn put(&self, url: String) {
        let (lock, cvar) = &*self.inner;
        let mut inner = lock.lock().unwrap();
        inner.urls.push_back(url);
        cvar.notify_one();
    }

    /// Marks the queue closed: pending and future `take` calls that would
    /// otherwise block return `None` once drained.
    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        let mut inner = lock.lock().unwrap();
        inner.closed = true;
        cvar.notify_all();
    }

    /// Blocks until a URL is available, the queue is closed and empty, or
    /// `poll_interval` elapses (so callers can re-check an external cancel
    /// signal between waits).
    pub fn take_timeout(&self, poll_interval: Duration) -> TakeResult {
        let (lock, cvar) = &*self.inner;
        let mut inner = lock.lock().unwrap();
        loop {
            if let Some(url) = inner.urls.pop_front() {
                return TakeResult::Url(url);
            }
            if inner.closed {
                return TakeResult::Closed;
            }
            let (guard, timeout) = cvar.wait_timeout(inner, poll_interval).unwrap();
            inner = guard;
            if timeout.timed_out() && inner.urls.is_empty() && !inner.closed {
                return TakeResult::TimedOut;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.0.lock().unwrap().urls.len()
    }
}

impl Default for UrlQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TakeResult {
    Url(String),
    Closed,
    TimedOut,
}
