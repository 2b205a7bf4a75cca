//! Binary progress journal.
//!
//! Layout (little-endian, fixed for cross-host resume):
//! ```text
//! byte 0        : W, the byte width of every field that follows
//! bytes 1..W    : total size, W bytes
//! bytes 1+W..   : P entries of W bytes each, entry i = cur_i (absolute write position)
//! ```
//! `W = ceil(bits(total_size)/8) + 1`, so the format scales from kilobyte to
//! terabyte files without a fixed-width enum.

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct Journal {
    file: File,
    path: PathBuf,
    w: u8,
    total_size: u64,
    parts: usize,
}

fn bits_needed(n: u64) -> u32 {
    if n == 0 {
        0
    } else {
        64 - n.leading_zeros()
    }
}

/// `W = ceil(bits(total_size)/8) + 1`.
pub fn byte_width(total_size: u64) -> u8 {
    let bits = bits_needed(total_size);
    (((bits + 7) / 8) + 1) as u8
}

fn write_field(buf: &mut Vec<u8>, value: u64, w: u8) {
    let bytes = value.to_le_bytes();
    let w = w as usize;
    // `w` can reach 9 (values with the high bit of a u64 set); the 9th byte
    // is always zero padding, since `value` never occupies more than 8 bytes.
    if w <= 8 {
        buf.extend_from_slice(&bytes[..w]);
    } else {
        buf.extend_from_slice(&bytes);
        buf.resize(buf.len() + (w - 8), 0);
    }
}

fn read_field(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

impl Journal {
    /// Creates a fresh journal for `parts` segments, each starting at its
    /// segment's `start` offset (computed the same way [`super::plan_segments`] does).
    pub fn create(path: &Path, total_size: u64, parts: usize) -> Result<Self> {
        let w = byte_width(total_size);
        let segs = super::plan_segments(total_size, parts);

        let mut buf = Vec::with_capacity(1 + w as usize * (parts + 1));
        buf.push(w);
        write_field(&mut buf, total_size, w);
        for seg in &segs {
            write_field(&mut buf, seg.start, w);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create journal {}", path.display()))?;
        file.write_all(&buf)?;
        file.flush()?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            w,
            total_size,
            parts,
        })
    }

    /// Opens an existing journal, deriving `parts` from its length. Returns
    /// `Ok(None)` if no journal file exists at `path`.
    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("failed to open journal"),
        };

        let mut header = [0u8; 1];
        if file.read(&mut header)? == 0 {
            bail!("journal {} is empty", path.display());
        }
        let w = header[0];
        if w == 0 {
            bail!("journal {} has invalid byte width 0", path.display());
        }

        let mut total_buf = vec![0u8; w as usize];
        file.read_exact(&mut total_buf)?;
        let total_size = read_field(&total_buf);

        let len = file.metadata()?.len();
        let header_len = 1 + w as u64;
        if len < header_len {
            bail!("journal {} truncated", path.display());
        }
        let remaining = len - header_len;
        if remaining % w as u64 != 0 {
            bail!("journal {} has misaligned length", path.display());
        }
        let parts = (remaining / w as u64) as usize;

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
            w,
            total_size,
            parts,
        }))
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn slot_offset(&self, i: usize) -> u64 {
        1 + self.w as u64 + (i as u64 * self.w as u64)
    }

    pub fn read_cur(&self, i: usize) -> Result<u64> {
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(self.slot_offset(i)))?;
        let mut buf = vec![0u8; self.w as usize];
        file.read_exact(&mut buf)?;
        Ok(read_field(&buf))
    }

    pub fn write_cur(&self, i: usize, value: u64) -> Result<()> {
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(self.slot_offset(i)))?;
        let mut buf = Vec::with_capacity(self.w as usize);
        write_field(&mut buf, value, self.w);
        file.write_all(&buf)?;
        Ok(())
    }

    /// Total on-disk length the journal should have: `1 + W*(P+1)`.
    pub fn expected_len(&self) -> u64 {
        1 + self.w as u64 * (self.parts as u64 + 1)
    }
}
