use once_cell::sync::Lazy;
use regex::Regex;

static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Reduce an HTML (or plain text) body to a single line of readable text.
///
/// Drops `<style>` and `<script>` blocks with their content, replaces every
/// remaining tag with a space, decodes `&nbsp;` and `&amp;`, then collapses
/// whitespace runs to one space and trims.
pub fn strip_html(input: &str) -> String {
    let text = STYLE_RE.replace_all(input, " ");
    let text = SCRIPT_RE.replace_all(&text, " ");
    let text = TAG_RE.replace_all(&text, " ");
    let text = text.replace("&nbsp;", " ").replace("&amp;", "&");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

/// Trim `input` and bound it to `max_len` characters.
///
/// Longer text keeps its first `max_len - 1` characters followed by `…`, so
/// the result never exceeds `max_len` characters.
pub fn clip(input: &str, max_len: usize) -> String {
    let text = input.trim();
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_len.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}
