//! Part worker pool (C6): one worker per incomplete segment, streaming a
//! ranged GET into the segment's writer and recycling its URL back to the
//! queue on success.

use crate::control::CancelToken;
use crate::part::DownloadPart;
use crate::queue::UrlQueue;
use crate::segfile::SegmentWriter;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Matches the reference implementation's fixed chunk size; requested from
/// curl via `CURLOPT_BUFFERSIZE` as the closest equivalent to `iter_content(chunk_size=...)`.
pub const CHUNK_SIZE: usize = 20 * 1024;

/// Fixed delay between a 429/425 response and the next attempt on the same URL.
const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct WorkerOutcome {
    pub index: usize,
    pub ok: bool,
}

/// Runs one segment to completion (or a fatal error / cancellation).
/// `url` is consumed exactly once per HTTP transaction; on success it is
/// pushed back onto `queue` so another segment can reuse it.
pub fn run_part_worker(
    part: &DownloadPart,
    mut writer: SegmentWriter,
    url: String,
    queue: &UrlQueue,
    cancel: &CancelToken,
    conn_timeout: Duration,
) -> Result<()> {
    part.mark_started();

    if writer.is_complete() {
        part.mark_completed();
        return Ok(());
    }

    loop {
        if cancel.is_cancelled() {
            part.mark_error("cancelled");
            bail!("cancelled");
        }

        let status = match download_range(&mut writer, &url, part, cancel, conn_timeout) {
            Ok(s) => s,
            Err(e) => {
                part.mark_error(e.to_string());
                return Err(e);
            }
        };

        match status {
            429 | 425 => {
                std::thread::sleep(RATE_LIMIT_RETRY_DELAY);
                continue;
            }
            200 | 206 => {
                if !writer.is_complete() {
                    let msg = format!(
                        "partial transfer: expected {} bytes, received up to offset {}",
                        writer.segment().end,
                        writer.cur()
                    );
                    part.mark_error(msg.clone());
                    bail!(msg);
                }
                break;
            }
            other => {
                let msg = format!("unexpected HTTP status {other} on ranged GET");
                part.mark_error(msg.clone());
                bail!(msg);
            }
        }
    }

    writer.close().context("closing segment writer")?;
    part.mark_completed();
    queue.put(url);
    Ok(())
}

fn download_range(
    writer: &mut SegmentWriter,
    url: &str,
    part: &DownloadPart,
    cancel: &CancelToken,
    conn_timeout: Duration,
) -> Result<u32> {
    let seg = writer.segment();
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.range(&format!("{}-{}", writer.cur(), seg.end.saturating_sub(1)))?;
    easy.buffer_size(CHUNK_SIZE)?;
    easy.connect_timeout(conn_timeout)?;

    let mut list = curl::easy::List::new();
    list.append("Connection: close")?;
    easy.http_headers(list)?;

    let mut write_err: Option<anyhow::Error> = None;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            if cancel.is_cancelled() {
                return Ok(0);
            }
            match writer.write(data) {
                Ok(()) => {
                    part.record_bytes(data.len() as u64);
                    Ok(data.len())
                }
                Err(e) => {
                    write_err = Some(e);
                    Ok(0)
                }
            }
        })?;
        transfer.perform().context("range GET failed")?;
    }
    if let Some(e) = write_err {
        return Err(e);
    }

    Ok(easy.response_code()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_matches_reference_implementation() {
        assert_eq!(CHUNK_SIZE, 20480);
    }

    #[test]
    fn rate_limit_delay_is_five_seconds() {
        assert_eq!(RATE_LIMIT_RETRY_DELAY, Duration::from_secs(5));
    }
}
