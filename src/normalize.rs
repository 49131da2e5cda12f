//! Timestamp normalization as a post-processing pass.
//!
//! Adapters store dates exactly as their service returns them. The aggregator
//! then runs [`normalize_timestamps`], which rewrites time-like fields into
//! [`FieldValue::Timestamp`] so every source serializes dates the same way.
//!
//! A field is considered time-like by its key (`date`, `published`,
//! `updated`, `created`, `*_at`, `*_date`, `*_utc`). Recognised text formats:
//!
//! | Format | Example |
//! |--------|---------|
//! | RFC 3339 | `2024-05-01T12:00:00Z` |
//! | RFC 2822 | `Wed, 01 May 2024 12:00:00 +0000` |
//! | ISO with compact offset | `2024-05-01T12:00:00+0000` |
//! | naive ISO | `2024-05-01T12:00:00.123`, `2024-05-01 12:00:00` |
//! | plain date | `2024-05-01` |
//! | relative | `3 hours ago`, `a day ago`, `yesterday`, `just now` |
//!
//! Relative values resolve against the record's `retrieved_at`. Numeric
//! `*_utc` fields are read as Unix seconds. Anything else is left untouched.

use crate::models::{FieldValue, Record};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_AGE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)^(an?|\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago$").ok()
});

/// Rewrite time-like fields of every record (and nested records) into
/// timestamps.
pub fn normalize_timestamps(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().map(normalize_record).collect()
}

/// Single-record form of [`normalize_timestamps`].
pub fn normalize_record(mut record: Record) -> Record {
    let reference = record.retrieved_at();
    for (key, value) in record.fields_mut().iter_mut() {
        let replacement = match value {
            FieldValue::Records(children) => {
                let taken = std::mem::take(children);
                Some(FieldValue::Records(normalize_timestamps(taken)))
            }
            FieldValue::Text(text) if is_time_key(key) => {
                parse_timestamp(text, reference).map(FieldValue::Timestamp)
            }
            FieldValue::Integer(secs) if key.ends_with("_utc") => {
                DateTime::from_timestamp(*secs, 0).map(FieldValue::Timestamp)
            }
            FieldValue::Float(secs) if key.ends_with("_utc") && secs.is_finite() => {
                DateTime::from_timestamp(secs.trunc() as i64, 0).map(FieldValue::Timestamp)
            }
            _ => None,
        };
        if let Some(new_value) = replacement {
            *value = new_value;
        }
    }
    record
}

fn is_time_key(key: &str) -> bool {
    matches!(
        key,
        "date" | "published" | "updated" | "created" | "modified" | "last_modified"
    ) || key.ends_with("_at")
        || key.ends_with("_date")
        || key.ends_with("_utc")
}

/// Parse one of the supported textual formats. `reference` anchors relative
/// ages.
pub fn parse_timestamp(raw: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    parse_relative(text, reference)
}

fn parse_relative(text: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_ascii_lowercase();
    match lower.as_str() {
        "just now" | "now" | "today" => return Some(reference),
        "yesterday" => return Some(reference - Duration::days(1)),
        _ => {}
    }

    let caps = RELATIVE_AGE.as_ref()?.captures(&lower)?;
    let amount: i64 = match &caps[1] {
        "a" | "an" => 1,
        n => n.parse().ok()?,
    };
    let unit = match &caps[2] {
        "second" => Duration::seconds(1),
        "minute" => Duration::minutes(1),
        "hour" => Duration::hours(1),
        "day" => Duration::days(1),
        "week" => Duration::weeks(1),
        "month" => Duration::days(30),
        "year" => Duration::days(365),
        _ => return None,
    };
    reference.checked_sub_signed(unit * i32::try_from(amount).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_absolute_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for raw in [
            "2024-05-01T12:00:00Z",
            "2024-05-01T14:00:00+02:00",
            "Wed, 01 May 2024 12:00:00 +0000",
            "2024-05-01T12:00:00+0000",
            "2024-05-01T12:00:00.000",
            "2024-05-01 12:00:00",
        ] {
            assert_eq!(parse_timestamp(raw, reference()), Some(expected), "{raw}");
        }
        assert_eq!(
            parse_timestamp("2024-05-01", reference()),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_relative_ages() {
        let r = reference();
        assert_eq!(parse_timestamp("3 hours ago", r), Some(r - Duration::hours(3)));
        assert_eq!(parse_timestamp("a day ago", r), Some(r - Duration::days(1)));
        assert_eq!(parse_timestamp("2 weeks ago", r), Some(r - Duration::weeks(2)));
        assert_eq!(parse_timestamp("yesterday", r), Some(r - Duration::days(1)));
        assert_eq!(parse_timestamp("soon", r), None);
    }

    #[test]
    fn test_normalize_rewrites_time_keys_only() {
        let record = Record::new("1")
            .with("created_at", "2024-05-01T12:00:00Z")
            .with("title", "2024-05-01")
            .with("created_utc", 1714564800.0)
            .with("published", "not a date");

        let out = normalize_record(record);
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(out.get("created_at").unwrap().as_timestamp(), Some(expected));
        assert_eq!(out.get("created_utc").unwrap().as_timestamp(), Some(expected));
        assert_eq!(out.text("title"), Some("2024-05-01"));
        assert_eq!(out.text("published"), Some("not a date"));
    }

    #[test]
    fn test_normalize_recurses_into_replies() {
        let reply = Record::new("c1").with("created_at", "2024-05-01T12:00:00Z");
        let record = Record::new("p1").with("replies", vec![reply]);

        let out = normalize_record(record);
        let replies = out.get("replies").unwrap().as_records().unwrap();
        assert!(replies[0].get("created_at").unwrap().as_timestamp().is_some());
    }

    #[test]
    fn test_normalize_keeps_retrieved_at() {
        let record = Record::new("1").with("date", "2 days ago");
        let stamp = record.retrieved_at();
        let out = normalize_record(record);
        assert_eq!(out.retrieved_at(), stamp);
        assert_eq!(
            out.get("date").unwrap().as_timestamp(),
            Some(stamp - Duration::days(2))
        );
    }
}
