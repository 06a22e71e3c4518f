//! Reply grammar for `STAT` and `UIDL`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static STAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\+OK\s+(\d+)\s+(\d+)").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub count: u32,
    pub size: u64,
}

/// Parse `+OK <count> <size>`. Anything else reads as an empty mailbox.
pub fn parse_stat(line: &str) -> Stat {
    STAT_RE
        .captures(line.trim())
        .map(|cap| Stat {
            count: cap[1].parse().unwrap_or(0),
            size: cap[2].parse().unwrap_or(0),
        })
        .unwrap_or_default()
}

/// Parse a `UIDL` body into an index → UID map.
///
/// Lines that do not start with a positive index followed by a UID are
/// skipped.
pub fn parse_uidl(body: &str) -> BTreeMap<u32, String> {
    body.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let index = parts.next()?.parse::<u32>().ok().filter(|i| *i > 0)?;
            let uid = parts.next()?;
            Some((index, uid.to_string()))
        })
        .collect()
}
