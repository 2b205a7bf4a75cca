//! Landing page parsing: turn a hosting page's HTML into a [`LandingInfo`].
//!
//! The concrete regex-based parser mirrors the markup assumptions of the
//! site this pipeline targets; callers needing a different host can supply
//! their own [`PageParser`] implementation.

use crate::errors::DownloadError;
use crate::sanitize::sanitize_filename;
use regex::Regex;
use std::sync::OnceLock;

/// Everything the controller needs to know about a parsed landing page.
#[derive(Debug, Clone)]
pub struct LandingInfo {
    pub page_url: String,
    pub filename: String,
    /// CAPTCHA-free, full-speed URL. When set, the controller skips the
    /// acquirer entirely and downloads with a single part.
    pub quick_download_url: Option<String>,
    /// CAPTCHA-free but rate-limited URL, classified the same way as a
    /// solved-CAPTCHA response.
    pub slow_direct_url: Option<String>,
    /// URL of the CAPTCHA challenge page.
    pub captcha_url: Option<String>,
    /// Some origins require a disclaimer POST before any other request on
    /// a fresh session/circuit.
    pub disclaimer_url: Option<String>,
}

impl LandingInfo {
    /// At least one of the three download paths must be present.
    pub fn has_any_download_method(&self) -> bool {
        self.quick_download_url.is_some()
            || self.slow_direct_url.is_some()
            || self.captcha_url.is_some()
    }
}

pub trait PageParser: Send + Sync {
    fn parse(&self, html: &str, page_url: &str) -> Result<LandingInfo, DownloadError>;
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title>(.*?)</title>").expect("static regex"))
}

fn quick_download_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="(/quickDownload/[^"]*)""#).expect("static regex"))
}

fn dialog_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"data-href="(/download-dialog/free/[^"]*)""#).expect("static regex"))
}

fn direct_download_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"class="[^"]*direct[^"]*"[^>]*data-href="(/download-dialog/free/[^"]*)""#)
            .expect("static regex")
    })
}

fn disclaimer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"name="disclaimer"[^>]*action="([^"]*)""#).expect("static regex"))
}

/// Default parser, grounded in the regex extraction used against the
/// reference hosting site: filename from `<title>`, action URLs from
/// `href`/`data-href` attributes on the download button.
#[derive(Default)]
pub struct DefaultPageParser;

impl PageParser for DefaultPageParser {
    fn parse(&self, html: &str, page_url: &str) -> Result<LandingInfo, DownloadError> {
        let filename = title_re()
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .map(|title| title.split('|').next().unwrap_or(title).trim())
            .map(sanitize_filename)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DownloadError::Parse("no <title> found on landing page".into()))?;

        let quick_download_url = quick_download_re()
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| absolutize(page_url, m.as_str()));

        let (slow_direct_url, captcha_url) = if let Some(m) = direct_download_re().captures(html) {
            let url = absolutize(page_url, &m[1]);
            (Some(url), None)
        } else if let Some(m) = dialog_href_re().captures(html) {
            let url = absolutize(page_url, &m[1]);
            (None, Some(url))
        } else {
            (None, None)
        };

        let disclaimer_url = disclaimer_re()
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| absolutize(page_url, m.as_str()));

        let info = LandingInfo {
            page_url: page_url.to_string(),
            filename,
            quick_download_url,
            slow_direct_url,
            captcha_url,
            disclaimer_url,
        };

        if !info.has_any_download_method() {
            return Err(DownloadError::Parse(
                "landing page exposes no known download method".into(),
            ));
        }

        Ok(info)
    }
}

fn absolutize(page_url: &str, path_or_url: &str) -> String {
    if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
        return path_or_url.to_string();
    }
    match url::Url::parse(page_url).and_then(|base| base.join(path_or_url)) {
        Ok(joined) => joined.to_string(),
        Err(_) => path_or_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quick_download_and_title() {
        let html = r#"<html><head><title>debian-12.5.0-amd64-netinst.iso | Free download</title></head>
            <body><a href="/quickDownload/abc123?id=1&tm=9999999999">Download</a></body></html>"#;
        let parser = DefaultPageParser;
        let info = parser.parse(html, "https://example.com/file/xyz").unwrap();
        assert_eq!(info.filename, "debian-12.5.0-amd64-netinst.iso");
        assert!(info.quick_download_url.unwrap().contains("/quickDownload/abc123"));
    }

    #[test]
    fn parses_captcha_dialog_link() {
        let html = r#"<title>archive.zip</title>
            <a data-href="/download-dialog/free/xyz987">Free download</a>"#;
        let parser = DefaultPageParser;
        let info = parser.parse(html, "https://example.com/file/xyz").unwrap();
        assert!(info.captcha_url.unwrap().ends_with("/download-dialog/free/xyz987"));
        assert!(info.slow_direct_url.is_none());
    }

    #[test]
    fn parses_direct_download_button() {
        let html = r#"<title>archive.zip</title>
            <a class="btn direct" data-href="/download-dialog/free/xyz987">Free download</a>"#;
        let parser = DefaultPageParser;
        let info = parser.parse(html, "https://example.com/file/xyz").unwrap();
        assert!(info.slow_direct_url.is_some());
        assert!(info.captcha_url.is_none());
    }

    #[test]
    fn rejects_page_without_download_method() {
        let html = "<title>nothing here</title><body>no links</body>";
        let parser = DefaultPageParser;
        assert!(parser.parse(html, "https://example.com/file/xyz").is_err());
    }

    #[test]
    fn title_cut_at_pipe_and_sanitized() {
        let html = r#"<title>weird<name>.iso | Site</title>
            <a href="/quickDownload/a">x</a>"#;
        let parser = DefaultPageParser;
        let info = parser.parse(html, "https://example.com/file/xyz").unwrap();
        assert_eq!(info.filename, "weird-name-.iso");
    }
}
