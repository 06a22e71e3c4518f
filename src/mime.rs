//! Header block parsing and raw-message → [`Message`] conversion.
//!
//! Only what a mailbox preview needs: unfolded headers, decoded subject and
//! sender, a date, and a plain-text rendition of the body. Multipart
//! structure is not walked.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::sync::types::Message;
use crate::text::{clip, strip_html};

pub const SNIPPET_LEN: usize = 180;
pub const BODY_LEN: usize = 8000;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:]+):\s*(.*)$").unwrap());
static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n\r?\n").unwrap());

/// Parse a header block into a map keyed by lowercase header name.
///
/// Parsing stops at the first empty line. Lines starting with a space or tab
/// continue the previous header and are appended after a single space.
/// Lines that are neither a header nor a continuation are ignored; a later
/// duplicate header replaces an earlier one.
pub fn parse_headers(raw: &str) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(value) = current.as_ref().and_then(|key| headers.get_mut(key)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        let Some(cap) = HEADER_RE.captures(line) else {
            continue;
        };
        let key = cap[1].to_lowercase();
        headers.insert(key.clone(), cap[2].trim().to_string());
        current = Some(key);
    }

    headers
}

/// Decode RFC 2047 encoded words (`=?UTF-8?B?...?=`) in a header value.
fn decode_header_value(value: &str) -> String {
    let line = format!("X: {}", value);
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => value.to_string(),
    }
}

/// Parse a message date, falling back to `fallback` when it is unreadable.
pub fn parse_date(date_str: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(date_str).map(|dt| dt.with_timezone(&Utc)))
        .ok()
        .or_else(|| {
            mailparse::dateparse(date_str)
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
        })
        .unwrap_or(fallback)
}

/// Build a [`Message`] from a raw RFC 822 block (headers, blank line, body).
///
/// Never fails: a missing subject becomes `(No subject)`, a missing sender
/// `Unknown sender`, a missing or unreadable date the current time. The id is
/// the `Message-ID` header when present, else `fallback_id`.
pub fn parse_raw_message(raw: &str, fallback_id: &str) -> Message {
    let (header_part, body) = match BLANK_LINE_RE.find(raw) {
        Some(m) => (&raw[..m.start()], &raw[m.end()..]),
        None => (raw, ""),
    };
    let headers = parse_headers(header_part);

    let subject = headers
        .get("subject")
        .filter(|s| !s.is_empty())
        .map(|s| decode_header_value(s))
        .unwrap_or_else(|| "(No subject)".to_string());
    let from = headers
        .get("from")
        .filter(|s| !s.is_empty())
        .map(|s| decode_header_value(s))
        .unwrap_or_else(|| "Unknown sender".to_string());
    let now = Utc::now();
    let received_at = headers
        .get("date")
        .map(|d| parse_date(d, now))
        .unwrap_or(now);
    let id = headers
        .get("message-id")
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| fallback_id.to_string());

    let body_text = strip_html(body);

    Message {
        id,
        from,
        subject,
        snippet: clip(&body_text, SNIPPET_LEN),
        body_text: clip(&body_text, BODY_LEN),
        received_at,
        is_unread: true,
    }
}
