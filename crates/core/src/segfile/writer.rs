//! Per-segment writer: streams chunks into the data file at absolute offsets
//! and advances the journal's recorded position after each chunk.

use super::journal::Journal;
use super::Segment;
use anyhow::{Context, Result};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

pub struct SegmentWriter {
    data_file: std::fs::File,
    journal: Journal,
    index: usize,
    segment: Segment,
    cur: u64,
}

impl SegmentWriter {
    pub(crate) fn open(
        data_path: &std::path::Path,
        journal_path: PathBuf,
        index: usize,
        segment: Segment,
        cur: u64,
    ) -> Result<Self> {
        let data_file = std::fs::OpenOptions::new()
            .write(true)
            .open(data_path)
            .with_context(|| format!("failed to open data file {}", data_path.display()))?;
        let journal = Journal::open_existing(&journal_path)?
            .with_context(|| format!("journal {} disappeared", journal_path.display()))?;
        Ok(Self {
            data_file,
            journal,
            index,
            segment,
            cur,
        })
    }

    pub fn cur(&self) -> u64 {
        self.cur
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn is_complete(&self) -> bool {
        self.cur >= self.segment.end
    }

    /// Writes `chunk` at the current position, then persists the new
    /// position to the journal. The data write happens before the journal
    /// write so a crash never makes the journal claim bytes that were not
    /// actually flushed toward the data file.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.write_at(self.cur, chunk)?;
        self.cur += chunk.len() as u64;
        self.journal.write_cur(self.index, self.cur)?;
        Ok(())
    }

    #[cfg(unix)]
    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.data_file
            .write_at(data, offset)
            .context("segment data write failed")?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.data_file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.data_file.sync_data().context("segment sync failed")?;
        Ok(())
    }
}
