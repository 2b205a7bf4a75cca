//! Filesystem-reserved character sanitization for filenames extracted from a
//! landing page's `<title>` tag.

use regex::Regex;
use std::sync::OnceLock;

fn reserved_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:,"/\\|?*]"#).expect("static regex"))
}

/// Replaces characters that are reserved on common filesystems (`<>:,"/\|?*`)
/// with `-`. Does not trim, truncate, or otherwise touch the rest of the name.
pub fn sanitize_filename(name: &str) -> String {
    reserved_chars().replace_all(name, "-").into_owned()
}
