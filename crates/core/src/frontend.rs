//! Frontend capability: a read-only observer over part/statistics state,
//! plus an interactive prompt for overwrite confirmation and passwords.

use crate::acquirer::StatisticsSnapshot;
use crate::part::PartSnapshot;
use anyhow::Result;
use std::io::Write;

pub trait Frontend: Send + Sync {
    /// Called roughly every 500ms with a fresh snapshot of every part and
    /// the link-acquisition statistics.
    fn observe(&self, parts: &[PartSnapshot], stats: StatisticsSnapshot);

    /// Asks the user a yes/no question (e.g. "overwrite existing file?").
    /// A non-interactive frontend should return `default`.
    fn confirm(&self, question: &str, default: bool) -> bool {
        let _ = question;
        default
    }

    /// Asks the user for free-form text (e.g. a landing-page password).
    /// A non-interactive frontend should return an error.
    fn prompt(&self, question: &str) -> Result<String> {
        anyhow::bail!("no interactive prompt available for: {question}")
    }

    /// Called once after the download loop exits, successfully or not.
    fn finished(&self, success: bool, message: &str);
}

/// Terminal frontend: redraws either one aggregate line or one line per part,
/// plus a summary line on completion.
pub struct ConsoleFrontend {
    interactive: bool,
    parts_progress: bool,
}

impl ConsoleFrontend {
    pub fn new(interactive: bool) -> Self {
        Self {
            interactive,
            parts_progress: false,
        }
    }

    /// Show one status line per part instead of a single aggregate line.
    pub fn with_parts_progress(mut self, enabled: bool) -> Self {
        self.parts_progress = enabled;
        self
    }
}

impl Frontend for ConsoleFrontend {
    fn observe(&self, parts: &[PartSnapshot], stats: StatisticsSnapshot) {
        if self.parts_progress {
            for p in parts {
                let len = p.segment_len.max(1);
                let pct = (p.bytes_total.min(len) as f64 / len as f64) * 100.0;
                eprintln!(
                    "part {:>3}: {:?} {:>5.1}%{}",
                    p.index,
                    p.status,
                    pct,
                    p.message
                        .as_deref()
                        .map(|m| format!(" ({m})"))
                        .unwrap_or_default()
                );
            }
            return;
        }

        let done: u64 = parts.iter().map(|p| p.bytes_total).sum();
        let total: u64 = parts.iter().map(|p| p.segment_len).sum();
        let pct = if total > 0 {
            done as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        eprint!(
            "\r{:>5.1}% ({}/{} bytes) — circuit attempts: {} ok / {} total",
            pct, done, total, stats.ok, stats.all
        );
        let _ = std::io::stderr().flush();
    }

    fn confirm(&self, question: &str, default: bool) -> bool {
        if !self.interactive {
            return default;
        }
        eprint!("{question} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return default;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn prompt(&self, question: &str) -> Result<String> {
        if !self.interactive {
            anyhow::bail!("not running interactively, cannot prompt for: {question}");
        }
        eprint!("{question}: ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn finished(&self, success: bool, message: &str) {
        eprintln!();
        if success {
            eprintln!("done: {message}");
        } else {
            eprintln!("failed: {message}");
        }
    }
}

/// Machine-readable frontend: one JSON object per observation, for
/// embedding anondl as a service (`--frontend json`).
pub struct JsonFrontend;

impl Frontend for JsonFrontend {
    fn observe(&self, parts: &[PartSnapshot], stats: StatisticsSnapshot) {
        let done: u64 = parts.iter().map(|p| p.bytes_total).sum();
        let total: u64 = parts.iter().map(|p| p.segment_len).sum();
        println!(
            r#"{{"bytes_done":{done},"bytes_total":{total},"acquisition_ok":{},"acquisition_all":{}}}"#,
            stats.ok, stats.all
        );
    }

    fn finished(&self, success: bool, message: &str) {
        println!(r#"{{"event":"finished","success":{success},"message":{message:?}}}"#);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::PartStatus;

    #[test]
    fn non_interactive_console_uses_defaults() {
        let f = ConsoleFrontend::new(false);
        assert!(!f.confirm("overwrite?", false));
        assert!(f.prompt("password").is_err());
    }

    #[test]
    fn observe_does_not_panic_on_empty_parts() {
        let f = ConsoleFrontend::new(false);
        f.observe(&[], StatisticsSnapshot::default());
    }

    #[test]
    fn part_snapshot_shape_used_by_observe() {
        let snap = PartSnapshot {
            index: 0,
            status: PartStatus::Running,
            bytes_total: 10,
            segment_len: 100,
            message: None,
        };
        assert_eq!(snap.bytes_total, 10);
    }
}
