//! Date normalization with chrono format strings.
//!
//! Date-only patterns produce `YYYY-MM-DD`, patterns with a time produce
//! `YYYY-MM-DDTHH:MM:SS` and patterns with an offset keep it. The special
//! patterns `rfc3339` and `rfc2822` use chrono's dedicated parsers.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use regex::Regex;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

static ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("ordinal regex is valid")
});

const TIME_SPECIFIERS: [&str; 11] = [
    "%H", "%I", "%k", "%l", "%M", "%S", "%T", "%R", "%r", "%X", "%p",
];
const ZONE_SPECIFIERS: [&str; 3] = ["%z", "%:z", "%#z"];
const DAY_SPECIFIERS: [&str; 6] = ["%d", "%e", "%j", "%F", "%D", "%x"];

/// Parse `value` with the first matching pattern and return it normalized.
pub fn normalize(value: &str, patterns: &[String]) -> Option<String> {
    let cleaned = clean(value);
    patterns.iter().find_map(|pattern| parse_with(&cleaned, pattern))
}

/// Strip ordinal suffixes and collapse whitespace.
fn clean(value: &str) -> String {
    let stripped = ORDINAL.replace_all(value, "$1");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_with(value: &str, pattern: &str) -> Option<String> {
    match pattern.to_ascii_lowercase().as_str() {
        "rfc3339" | "iso8601" => {
            return DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        "rfc2822" => {
            return DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        _ => {}
    }

    if contains_any(pattern, &ZONE_SPECIFIERS) {
        return DateTime::parse_from_str(value, pattern)
            .ok()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if contains_any(pattern, &TIME_SPECIFIERS) {
        return NaiveDateTime::parse_from_str(value, pattern)
            .ok()
            .map(|dt| dt.format(DATE_TIME_FORMAT).to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, pattern) {
        return Some(date.format(DATE_FORMAT).to_string());
    }
    // Month precision, e.g. "%B %Y": pin to the first day.
    if !contains_any(pattern, &DAY_SPECIFIERS) {
        let value = format!("1 {value}");
        let pattern = format!("%d {pattern}");
        return NaiveDate::parse_from_str(&value, &pattern)
            .ok()
            .map(|date| date.format(DATE_FORMAT).to_string());
    }
    None
}

fn contains_any(pattern: &str, specifiers: &[&str]) -> bool {
    specifiers.iter().any(|s| pattern.contains(s))
}
