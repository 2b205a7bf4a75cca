//! Minimal hosting-site double: a landing page plus the quick-download,
//! direct-slow, and CAPTCHA-dialog endpoints the link acquirer drives.
//!
//! Grounded in `range_server.rs`'s raw HTTP/1.1 parsing idiom, extended with
//! routing by path and a request body so it can also stand in for the POST
//! endpoints (password unlock, CAPTCHA answer submission).

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

pub enum Scenario {
    /// Landing page exposes a CAPTCHA-free quick-download link straight away.
    Quick,
    /// Landing page exposes only a rate-limited direct link; the acquirer
    /// must retry it `fail_times` times before it starts succeeding.
    DirectSlow { fail_times: u32 },
    /// Landing page exposes only a CAPTCHA dialog; the acquirer must submit
    /// `bad_times` wrong answers (server-classified `formErrorContent`)
    /// before an answer is accepted.
    Captcha { bad_times: u32 },
    /// Landing page is gated behind a password: the initial GET exposes a
    /// quick-download link that 404s, and only a password POST reveals the
    /// real one. Proves the unlock step actually ran end to end.
    PasswordThenQuick,
}

struct State {
    body: Vec<u8>,
    scenario: Scenario,
    attempts: AtomicU32,
    port: u16,
}

/// Starts the double in a background thread. Returns the base URL, e.g.
/// "http://127.0.0.1:PORT/".
pub fn start(body: Vec<u8>, scenario: Scenario) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(State {
        body,
        scenario,
        attempts: AtomicU32::new(0),
        port,
    });
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&state);
            thread::spawn(move || handle(stream, &state));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

struct Req {
    method: String,
    path: String,
    body: Vec<u8>,
    range: Option<(u64, u64)>,
}

fn read_request(stream: &mut TcpStream) -> Option<Req> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    loop {
        let n = stream.read(&mut tmp).ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_header_end(&buf) {
            let header_str = std::str::from_utf8(&buf[..pos]).ok()?.to_string();
            let (method, path, content_length, range) = parse_headers(&header_str);
            let mut body = buf[pos + 4..].to_vec();
            while body.len() < content_length {
                let n2 = stream.read(&mut tmp).ok()?;
                if n2 == 0 {
                    break;
                }
                body.extend_from_slice(&tmp[..n2]);
            }
            return Some(Req {
                method,
                path,
                body,
                range,
            });
        }
        if buf.len() > 1 << 20 {
            break;
        }
    }
    None
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_headers(header: &str) -> (String, String, usize, Option<(u64, u64)>) {
    let mut method = String::new();
    let mut path = String::new();
    let mut content_length = 0usize;
    let mut range = None;
    for (i, line) in header.lines().enumerate() {
        if i == 0 {
            let mut parts = line.split_whitespace();
            method = parts.next().unwrap_or("").to_string();
            path = parts.next().unwrap_or("").to_string();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
            if name.eq_ignore_ascii_case("range") && value.to_lowercase().starts_with("bytes=") {
                let part = value[6..].trim();
                if let Some((a, b)) = part.split_once('-') {
                    let start = a.trim().parse::<u64>().unwrap_or(0);
                    let end_incl = if b.trim().is_empty() {
                        u64::MAX
                    } else {
                        b.trim().parse::<u64>().unwrap_or(0)
                    };
                    range = Some((start, end_incl));
                }
            }
        }
    }
    (method, path, content_length, range)
}

fn path_only(full: &str) -> &str {
    full.split('?').next().unwrap_or(full)
}

fn handle(mut stream: TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(10)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(10)));
    let req = match read_request(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let path = path_only(&req.path).to_string();

    match path.as_str() {
        "/file" => {
            let body = if req.method.eq_ignore_ascii_case("POST") {
                post_unlock_body(state)
            } else {
                landing_body(state)
            };
            write_html(&mut stream, &body);
        }
        "/quickDownload/q1" | "/dl/output.bin" => serve_file(&mut stream, &req, &state.body),
        "/quickDownload/locked" => {
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        }
        "/download-dialog/free/d1" => {
            let n = state.attempts.fetch_add(1, Ordering::SeqCst);
            let fail_times = match state.scenario {
                Scenario::DirectSlow { fail_times } => fail_times,
                _ => 0,
            };
            let text = if n < fail_times {
                "err: limit-exceeded".to_string()
            } else {
                success_json(state)
            };
            write_plain(&mut stream, &text);
        }
        "/download-dialog/free/c1" => {
            if req.method.eq_ignore_ascii_case("POST") {
                let n = state.attempts.fetch_add(1, Ordering::SeqCst);
                let bad_times = match state.scenario {
                    Scenario::Captcha { bad_times } => bad_times,
                    _ => 0,
                };
                let text = if n < bad_times {
                    r#"{"formErrorContent": "<div>wrong answer</div>"}"#.to_string()
                } else {
                    success_json(state)
                };
                write_plain(&mut stream, &text);
            } else {
                write_html(&mut stream, captcha_form_html());
            }
        }
        _ => {
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        }
    }
}

fn success_json(state: &State) -> String {
    format!(
        r#"{{"afterDownloadUrl": true, "slowDownloadLink": "http://127.0.0.1:{}/dl/output.bin?tm=9999999999"}}"#,
        state.port
    )
}

fn landing_body(state: &State) -> String {
    match state.scenario {
        Scenario::Quick => {
            r#"<html><head><title>testfile.bin</title></head><body>
            <a href="/quickDownload/q1?tm=9999999999">Download</a>
            </body></html>"#
                .to_string()
        }
        Scenario::DirectSlow { .. } => {
            r#"<title>testfile.bin</title>
            <a class="btn direct" data-href="/download-dialog/free/d1">Free download</a>"#
                .to_string()
        }
        Scenario::Captcha { .. } => {
            r#"<title>testfile.bin</title>
            <a data-href="/download-dialog/free/c1">Free download</a>"#
                .to_string()
        }
        Scenario::PasswordThenQuick => {
            r#"<title>testfile.bin</title>
            <a href="/quickDownload/locked?tm=9999999999">Download</a>
            This file is password protected."#
                .to_string()
        }
    }
}

fn post_unlock_body(_state: &State) -> String {
    r#"<html><head><title>testfile.bin</title></head><body>
    <a href="/quickDownload/q1?tm=9999999999">Download</a>
    </body></html>"#
        .to_string()
}

fn captcha_form_html() -> &'static str {
    r#"<form>
    <img src="/captcha/image.png?x=1" class="captcha-img" />
    <input type="hidden" name="_token_" value="tok123" />
    <input type="hidden" name="timestamp" value="1700000000" />
    <input type="hidden" name="salt" value="saltvalue" />
    <input type="hidden" name="hash" value="hashvalue" />
    <input type="hidden" name="captcha_type" value="default" />
    <input type="hidden" name="_do" value="downloadDialog-freeDownloadForm-submit" />
    </form>"#
}

fn write_html(stream: &mut TcpStream, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn write_plain(stream: &mut TcpStream, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn serve_file(stream: &mut TcpStream, req: &Req, body: &[u8]) {
    let total = body.len() as u64;
    if req.method.eq_ignore_ascii_case("HEAD") {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n\r\n",
            total
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    let (status, range_header, slice) = if let Some((start, end_incl)) = req.range {
        let start = start.min(total);
        let end_incl = end_incl.min(total.saturating_sub(1));
        if start > end_incl {
            ("416 Range Not Satisfiable", format!("bytes */{}", total), &body[0..0])
        } else {
            let start = start as usize;
            let end_excl = (end_incl + 1).min(total) as usize;
            let slice = body.get(start..end_excl).unwrap_or(&body[0..0]);
            (
                "206 Partial Content",
                format!("bytes {}-{}/{}", start, end_excl.saturating_sub(1), total),
                slice,
            )
        }
    } else {
        (
            "200 OK",
            format!("bytes 0-{}/{}", total.saturating_sub(1), total),
            body,
        )
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Range: {}\r\nAccept-Ranges: bytes\r\n\r\n",
        status,
        slice.len(),
        range_header
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}
