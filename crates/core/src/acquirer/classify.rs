//! Response classification by substring presence in the body, exactly as
//! the reference hosting site's free-download endpoint distinguishes
//! success, rate-limiting, blocking, and a wrong CAPTCHA answer.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Body contained `afterDownloadUrl`; `download_url` is the extracted
    /// `slowDownloadLink` JSON field.
    Success { download_url: String },
    /// Body contained `limit-exceeded`: this IP is rate-limited. Rotate.
    Limited,
    /// Body contained `blocked`: this IP is blocked outright. Rotate.
    Blocked,
    /// Body contained `formErrorContent`: wrong CAPTCHA answer. Retry same IP.
    BadCaptcha,
    /// None of the known markers matched; treated as a network-level miss. Rotate.
    Net,
}

pub fn classify_response(body: &str) -> Classification {
    if body.contains("afterDownloadUrl") {
        return match extract_slow_download_link(body) {
            Some(url) => Classification::Success { download_url: url },
            None => Classification::Net,
        };
    }
    if body.contains("limit-exceeded") {
        return Classification::Limited;
    }
    if body.contains("blocked") {
        return Classification::Blocked;
    }
    if body.contains("formErrorContent") {
        return Classification::BadCaptcha;
    }
    Classification::Net
}

fn extract_slow_download_link(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("slowDownloadLink")
        .and_then(|v| v.as_str())
        .map(String::from)
}
