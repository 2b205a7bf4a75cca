//! Segmented file store: a preallocated data file plus a sidecar progress
//! journal that survives crashes, grounded in the storage writer's
//! offset-write idiom but using a position-tracking journal instead of a
//! completion bitmap.

mod journal;
mod writer;

pub use journal::Journal;
pub use writer::SegmentWriter;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Half-open byte range `[start, end)` owned by one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
}

impl Segment {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Splits `total_size` into `parts` segments of `ceil(total_size/parts)`
/// bytes each; the last non-empty segment absorbs the remainder, and any
/// segment past the end of the file is empty (already complete).
pub fn plan_segments(total_size: u64, parts: usize) -> Vec<Segment> {
    assert!(parts > 0, "parts must be at least 1");
    let size = (total_size + parts as u64 - 1) / parts as u64;
    (0..parts)
        .map(|i| {
            let start = (i as u64 * size).min(total_size);
            let end = ((i as u64 + 1) * size).min(total_size);
            Segment { start, end }
        })
        .collect()
}

/// Preallocates `size` bytes for `file`. On Unix tries `posix_fallocate` for
/// real block allocation, falling back to `set_len` on failure or non-Unix.
fn preallocate(file: &std::fs::File, size: u64) -> Result<()> {
    #[cfg(unix)]
    {
        let fd = file.as_raw_fd();
        let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
        if r == 0 {
            return Ok(());
        }
        tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
    }
    file.set_len(size)?;
    Ok(())
}

/// Opens or creates the data file + journal pair for a download.
///
/// If a journal exists and its recorded total size matches `total_size`, the
/// existing journal (and its part count) is reused; otherwise both files are
/// recreated from scratch, matching the "advertised size changed" case from
/// the resume invariant.
pub struct SegFileStore {
    pub journal: Journal,
    pub segments: Vec<Segment>,
    data_path: PathBuf,
}

impl SegFileStore {
    pub fn open_or_create(
        data_path: &Path,
        journal_path: &Path,
        total_size: u64,
        requested_parts: usize,
    ) -> Result<Self> {
        let journal = match Journal::open_existing(journal_path)? {
            Some(j) if j.total_size() == total_size => j,
            _ => Journal::create(journal_path, total_size, requested_parts)?,
        };
        let parts = journal.parts();
        let segments = plan_segments(total_size, parts);

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(data_path)
            .with_context(|| format!("failed to open data file {}", data_path.display()))?;
        if file.metadata()?.len() != total_size {
            preallocate(&file, total_size).context("failed to preallocate data file")?;
        }

        Ok(Self {
            journal,
            segments,
            data_path: data_path.to_path_buf(),
        })
    }

    /// Returns a writer bound to segment `i`, resuming from its last recorded position.
    pub fn writer_for(&self, i: usize) -> Result<SegmentWriter> {
        let seg = self.segments[i];
        let cur = self.journal.read_cur(i)?;
        let cur = cur.max(seg.start).min(seg.end);
        SegmentWriter::open(&self.data_path, self.journal.path().to_path_buf(), i, seg, cur)
    }

    /// Sum of bytes written across all segments; read fresh from the journal
    /// without holding any worker lock, matching the read-only UI accessor.
    pub fn bytes_done(&self) -> Result<u64> {
        let mut total = 0u64;
        for (i, seg) in self.segments.iter().enumerate() {
            let cur = self.journal.read_cur(i)?;
            total += cur.saturating_sub(seg.start);
        }
        Ok(total)
    }

    pub fn total_size(&self) -> u64 {
        self.journal.total_size()
    }
}
