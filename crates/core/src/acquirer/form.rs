//! CAPTCHA challenge page parsing and form submission encoding.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;

const HIDDEN_FIELD_NAMES: [&str; 6] =
    ["_token_", "timestamp", "salt", "hash", "captcha_type", "_do"];

pub struct CaptchaForm {
    pub image_url: String,
    hidden: Vec<(String, String)>,
}

impl CaptchaForm {
    /// The hidden fields plus the solved answer, ready for URL-encoding.
    pub fn answer_fields(&self, answer: &str) -> Vec<(String, String)> {
        let mut fields = self.hidden.clone();
        fields.push(("captcha_value".to_string(), answer.to_string()));
        fields
    }
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<img[^>]*src="([^"]*captcha[^"]*)""#).expect("static regex"))
}

fn hidden_field_re(name: &str) -> Regex {
    Regex::new(&format!(
        r#"<input[^>]*name="{}"[^>]*value="([^"]*)""#,
        regex::escape(name)
    ))
    .expect("dynamic regex from fixed field names")
}

pub fn parse_captcha_form(html: &str) -> Result<CaptchaForm> {
    let image_url = image_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .context("no captcha image found")?;

    let mut hidden = Vec::with_capacity(HIDDEN_FIELD_NAMES.len());
    for name in HIDDEN_FIELD_NAMES {
        let value = hidden_field_re(name)
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .with_context(|| format!("missing hidden field '{name}' on captcha form"))?;
        hidden.push((name.to_string(), value));
    }

    Ok(CaptchaForm { image_url, hidden })
}

pub fn urlencode_fields(fields: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FORM: &str = r#"
        <form>
        <img src="/captcha/image.png?x=1" class="captcha-img" />
        <input type="hidden" name="_token_" value="tok123" />
        <input type="hidden" name="timestamp" value="1700000000" />
        <input type="hidden" name="salt" value="saltvalue" />
        <input type="hidden" name="hash" value="hashvalue" />
        <input type="hidden" name="captcha_type" value="default" />
        <input type="hidden" name="_do" value="downloadDialog-freeDownloadForm-submit" />
        </form>
    "#;

    #[test]
    fn parses_all_six_hidden_fields_and_image() {
        let form = parse_captcha_form(SAMPLE_FORM).unwrap();
        assert_eq!(form.image_url, "/captcha/image.png?x=1");
        assert_eq!(form.hidden.len(), 6);
        assert!(form.hidden.iter().any(|(k, v)| k == "_token_" && v == "tok123"));
    }

    #[test]
    fn missing_field_is_an_error() {
        let html = r#"<img src="/captcha.png" class="captcha" />"#;
        assert!(parse_captcha_form(html).is_err());
    }

    #[test]
    fn answer_fields_includes_captcha_value() {
        let form = parse_captcha_form(SAMPLE_FORM).unwrap();
        let fields = form.answer_fields("7x9q");
        assert!(fields.iter().any(|(k, v)| k == "captcha_value" && v == "7x9q"));
        assert_eq!(fields.len(), 7);
    }

    #[test]
    fn urlencode_escapes_special_characters() {
        let encoded = urlencode_fields(&[("a".to_string(), "b c&d".to_string())]);
        assert_eq!(encoded, "a=b+c%26d");
    }
}
