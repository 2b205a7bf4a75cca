//! Link cache: persists validated download URLs across runs so a resumed
//! download does not have to re-acquire a URL it already paid a CAPTCHA for.
//!
//! One URL per line. Validity is derived from the `tm=<unix-seconds>` query
//! parameter each URL carries, not from any metadata the cache file itself
//! stores.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct LinkCache {
    path: PathBuf,
    safety_margin_secs: i64,
}

impl LinkCache {
    pub fn new(path: impl Into<PathBuf>, safety_margin_secs: i64) -> Self {
        Self {
            path: path.into(),
            safety_margin_secs,
        }
    }

    /// Appends a newly acquired URL. Creates the file if absent.
    pub fn append(&self, url: &str) -> io::Result<()> {
        use std::io::Write;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", url)?;
        Ok(())
    }

    /// Returns all currently valid URLs, in insertion order, compacting the
    /// file to drop expired entries if any were found.
    pub fn get_all_valid(&self) -> io::Result<Vec<String>> {
        let lines = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let now = now_secs();
        let mut valid = Vec::new();
        let mut any_expired = false;
        for line in lines.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if is_link_valid(line, now, self.safety_margin_secs) {
                valid.push(line.to_string());
            } else {
                any_expired = true;
            }
        }

        if any_expired {
            let mut contents = String::new();
            for url in &valid {
                contents.push_str(url);
                contents.push('\n');
            }
            fs::write(&self.path, contents)?;
        }

        Ok(valid)
    }

    /// Removes the cache file entirely. Called on a fully successful download.
    pub fn delete(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A link is valid iff `now < tm - safety_margin`, where `tm` is parsed out
/// of the URL's query string.
fn is_link_valid(url: &str, now: i64, safety_margin_secs: i64) -> bool {
    match extract_tm(url) {
        Some(tm) => now < tm - safety_margin_secs,
        None => false,
    }
}

fn extract_tm(url: &str) -> Option<i64> {
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
    for pair in query.split(|c| c == '&' || c == ';') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == "tm" {
                return v.parse().ok();
            }
        }
    }
    None
}
