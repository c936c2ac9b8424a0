//! Calendar date arguments.
//!
//! Accepted: `YYYY-MM-DD` and `YYYY-MM` (read as the first of the month), years 0001 to 9999.
//! Everything is normalized to `YYYY-MM-DD` before it reaches upstream.

use chrono::{Datelike, NaiveDate};
use std::ops::RangeInclusive;

const YEARS: RangeInclusive<i32> = 1..=9999;

/// Parse a date argument, returning a human-readable reason on failure.
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("date must not be empty".to_string());
    }
    let parsed = match raw.len() {
        10 => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        // YYYY-MM: chrono needs a day to build a date.
        7 => NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok(),
        _ => None,
    };
    // `%Y` also takes signed and five-digit years.
    match parsed {
        Some(date) if raw.as_bytes()[0].is_ascii_digit() && YEARS.contains(&date.year()) => Ok(date),
        _ => Err(format!("`{}` is not a valid date (expected YYYY-MM-DD or YYYY-MM)", raw)),
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
