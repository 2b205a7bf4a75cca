//! Per-run link-acquisition counters, shared with the frontend observer.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Statistics {
    pub all: AtomicU64,
    pub ok: AtomicU64,
    pub bad: AtomicU64,
    pub limited: AtomicU64,
    pub blocked: AtomicU64,
    pub net: AtomicU64,
}

/// Read-only point-in-time copy for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub all: u64,
    pub ok: u64,
    pub bad: u64,
    pub limited: u64,
    pub blocked: u64,
    pub net: u64,
}

impl Statistics {
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            all: self.all.load(Ordering::Relaxed),
            ok: self.ok.load(Ordering::Relaxed),
            bad: self.bad.load(Ordering::Relaxed),
            limited: self.limited.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            net: self.net.load(Ordering::Relaxed),
        }
    }

    pub fn incr_all(&self) {
        self.all.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_ok(&self) {
        self.ok.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_bad(&self) {
        self.bad.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_limited(&self) {
        self.limited.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_net(&self) {
        self.net.fetch_add(1, Ordering::Relaxed);
    }
}
