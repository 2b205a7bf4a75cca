//! In-memory per-segment state, mutated only under its own mutex and read
//! by the frontend observer through a snapshot.

use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartStatus {
    Waiting,
    Running,
    Completed,
    Error,
}

struct PartState {
    status: PartStatus,
    bytes_this_attempt: u64,
    bytes_total: u64,
    start_time: Option<Instant>,
    completion_time: Option<Instant>,
    message: Option<String>,
}

/// One segment's worth of mutable download state.
pub struct DownloadPart {
    pub index: usize,
    pub from: u64,
    pub to: u64,
    state: Mutex<PartState>,
}

#[derive(Debug, Clone)]
pub struct PartSnapshot {
    pub index: usize,
    pub status: PartStatus,
    pub bytes_total: u64,
    pub segment_len: u64,
    pub message: Option<String>,
}

impl DownloadPart {
    pub fn new(index: usize, from: u64, to: u64, bytes_already: u64) -> Self {
        let status = if bytes_already >= to.saturating_sub(from) {
            PartStatus::Completed
        } else {
            PartStatus::Waiting
        };
        Self {
            index,
            from,
            to,
            state: Mutex::new(PartState {
                status,
                bytes_this_attempt: 0,
                bytes_total: bytes_already,
                start_time: None,
                completion_time: None,
                message: None,
            }),
        }
    }

    pub fn mark_started(&self) {
        let mut s = self.state.lock().unwrap();
        s.status = PartStatus::Running;
        s.start_time = Some(Instant::now());
    }

    pub fn record_bytes(&self, n: u64) {
        let mut s = self.state.lock().unwrap();
        s.bytes_this_attempt += n;
        s.bytes_total += n;
    }

    pub fn mark_completed(&self) {
        let mut s = self.state.lock().unwrap();
        s.status = PartStatus::Completed;
        s.completion_time = Some(Instant::now());
    }

    pub fn mark_error(&self, message: impl Into<String>) {
        let mut s = self.state.lock().unwrap();
        s.status = PartStatus::Error;
        s.message = Some(message.into());
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap().status == PartStatus::Completed
    }

    pub fn is_error(&self) -> bool {
        self.state.lock().unwrap().status == PartStatus::Error
    }

    pub fn snapshot(&self) -> PartSnapshot {
        let s = self.state.lock().unwrap();
        PartSnapshot {
            index: self.index,
            status: s.status,
            bytes_total: s.bytes_total,
            segment_len: self.to.saturating_sub(self.from),
            message: s.message.clone(),
        }
    }

    /// Short human-readable status line for the console frontend.
    pub fn status_line(&self) -> String {
        let s = self.state.lock().unwrap();
        let len = self.to.saturating_sub(self.from).max(1);
        let pct = (s.bytes_total.min(len) as f64 / len as f64) * 100.0;
        match s.status {
            PartStatus::Waiting => format!("part {:>3}: waiting", self.index),
            PartStatus::Running => {
                let elapsed = s.start_time.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
                let speed = if elapsed > 0.0 {
                    s.bytes_this_attempt as f64 / elapsed
                } else {
                    0.0
                };
                format!(
                    "part {:>3}: {:>5.1}% ({:.1} KiB/s)",
                    self.index,
                    pct,
                    speed / 1024.0
                )
            }
            PartStatus::Completed => format!("part {:>3}: done", self.index),
            PartStatus::Error => format!(
                "part {:>3}: error ({})",
                self.index,
                s.message.as_deref().unwrap_or("unknown")
            ),
        }
    }
}
