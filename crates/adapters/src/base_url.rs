use once_cell::sync::Lazy;
use regex::Regex;

use autowriter_core::config::DEFAULT_ENDPOINT;

const COMPLETIONS_PATH: &str = "/chat/completions";

static VERSION_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/v\d+(/|$)").expect("valid version pattern"));

/// Turns a configured base URL into the full chat-completions endpoint.
///
/// Blank input yields the default endpoint. A URL that already names the
/// completions path is kept as is.
pub fn resolve_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_ENDPOINT.to_string();
    }
    if trimmed.ends_with(COMPLETIONS_PATH) {
        return trimmed.to_string();
    }

    if VERSION_SEGMENT_RE.is_match(trimmed) {
        format!("{trimmed}{COMPLETIONS_PATH}")
    } else {
        format!("{trimmed}/v1{COMPLETIONS_PATH}")
    }
}
