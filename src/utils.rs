//! Small string and URL helpers shared by adapters and outputs.
//!
//! - Truncation for adapter-local text budgets and for log lines
//! - Slugification (Dev.to tags, Markdown anchors)
//! - HTML-to-text flattening for bodies that arrive as markup
//! - Host extraction for the "is this link self-referential" check

use scraper::Html;
use url::Url;

/// Truncate to at most `max` characters, appending `…` when anything was cut.
///
/// Operates on characters, never splitting a UTF-8 sequence.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_chars("hello", 10), "hello");
/// assert_eq!(truncate_chars("hello world", 5), "hello…");
/// ```
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}…", s[..byte_idx].trim_end()),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with the number of dropped bytes
/// appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}…(+{} bytes)", &s[..byte_idx], s.len() - byte_idx),
    }
}

/// Convert a title to a URL-friendly slug.
///
/// Lowercases, removes anything that is not alphanumeric, a space or a hyphen,
/// and turns spaces into hyphens.
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Collapse all runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flatten an HTML fragment to plain text, decoding entities.
pub fn strip_html(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    let text = parsed.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

/// Hostname of `url` without a leading `www.`.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_ascii_lowercase())
}

/// `true` when both URLs share a host, or one host is a subdomain of the other.
pub fn same_site(a: &str, b: &str) -> bool {
    match (host_of(a), host_of(b)) {
        (Some(ha), Some(hb)) => {
            ha == hb || ha.ends_with(&format!(".{hb}")) || hb.ends_with(&format!(".{ha}"))
        }
        _ => false,
    }
}
