//! Lenient parsing of the dates found in `Date` and `Received` fields.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::debug;

/// Formats tried after RFC 2822 and RFC 3339, on the text with any
/// day-of-week prefix removed.
const FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%d-%b-%Y %H:%M:%S %z",
];

/// Formats without a zone, read as UTC.
const NAIVE_FORMATS: &[&str] = &["%d %b %Y %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d-%b-%Y %H:%M:%S"];

const NAMED_ZONES: &[(&str, &str)] = &[
    ("UT", "+0000"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("JST", "+0900"),
];

/// Parse a mail date, keeping its UTC offset.
///
/// Accepts RFC 2822 (with or without day of week, trailing `(comment)` or a
/// named zone), RFC 3339, a few common variants, and finally whatever
/// `mail-parser` understands.
pub fn parse_date(input: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = strip_comment(input.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let bare = strip_day_of_week(trimmed);
    let numeric = replace_named_zone(bare);
    for candidate in [bare, numeric.as_str()] {
        for fmt in FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt);
            }
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(ndt.and_utc().fixed_offset());
            }
        }
    }

    let parsed = mail_parser_date(trimmed);
    if parsed.is_none() {
        debug!(date = trimmed, "Could not parse date");
    }
    parsed
}

/// Let `mail-parser` have a go at it by wrapping the text in a tiny message.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    let raw = format!("Date: {input}\n\n");
    let message = mail_parser::MessageParser::default().parse(raw.as_bytes())?;
    DateTime::parse_from_rfc3339(&message.date()?.to_rfc3339()).ok()
}

/// Drop a trailing `(CET)`-style comment.
fn strip_comment(s: &str) -> &str {
    match s.rfind('(') {
        Some(pos) if s.ends_with(')') => s[..pos].trim_end(),
        _ => s,
    }
}

fn strip_day_of_week(s: &str) -> &str {
    match s.split_once(',') {
        Some((day, rest)) if day.len() == 3 && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => s,
    }
}

fn replace_named_zone(s: &str) -> String {
    if let Some((head, zone)) = s.rsplit_once(' ') {
        let zone = zone.to_ascii_uppercase();
        if let Some((_, offset)) = NAMED_ZONES.iter().find(|(name, _)| *name == zone) {
            return format!("{head} {offset}");
        }
    }
    s.to_string()
}
