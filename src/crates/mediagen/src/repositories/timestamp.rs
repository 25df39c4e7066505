//! Timestamp columns shared with the producer
//!
//! The producer stores `CURRENT_TIMESTAMP` text, older rows may hold Unix
//! seconds. Both read back as Unix seconds in UTC.

use crate::error::{MediaError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Storage form written by this crate, matching SQLite's `CURRENT_TIMESTAMP`
pub fn storage_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a stored timestamp string into Unix seconds.
///
/// Accepts RFC 3339 (with `Z` or an offset), `YYYY-MM-DD HH:MM:SS[.fff]`
/// with either separator, a bare date, or a number of seconds. Naive values
/// are UTC.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Decode a nullable timestamp column stored as INTEGER, REAL or TEXT
pub(crate) fn decode_optional(row: &SqliteRow, column: &str) -> Result<Option<i64>> {
    if let Ok(secs) = row.try_get::<Option<i64>, _>(column) {
        return Ok(secs);
    }
    if let Ok(secs) = row.try_get::<Option<f64>, _>(column) {
        return Ok(secs.map(|s| s as i64));
    }

    let text: Option<String> = row.try_get(column)?;
    match text {
        None => Ok(None),
        Some(text) => parse_timestamp(&text).map(Some).ok_or_else(|| {
            MediaError::Database(format!("Unreadable timestamp '{}' in column {}", text, column))
        }),
    }
}

/// Decode a timestamp column that must be present
pub(crate) fn decode_required(row: &SqliteRow, column: &str) -> Result<i64> {
    decode_optional(row, column)?
        .ok_or_else(|| MediaError::Database(format!("Missing timestamp in column {}", column)))
}

/// SQL expression ordering a mixed INTEGER/TEXT timestamp column by time.
/// Unreadable text sorts as the epoch.
pub(crate) fn order_key(column: &str) -> String {
    format!(
        "(CASE typeof({c}) \
           WHEN 'integer' THEN {c} \
           WHEN 'real' THEN CAST({c} AS INTEGER) \
           ELSE COALESCE(CAST(strftime('%s', {c}) AS INTEGER), 0) \
         END)",
        c = column
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_producer_formats() {
        let expected = 1_767_261_600; // 2026-01-01 10:00:00 UTC
        assert_eq!(parse_timestamp("2026-01-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01 10:00:00.250"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01"), Some(expected - 36_000));
        assert_eq!(parse_timestamp("1767261600"), Some(expected));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2026-13-45 99:00:00"), None);
    }

    #[test]
    fn test_storage_form_round_trips() {
        let at = DateTime::from_timestamp(1_767_261_600, 0).unwrap();
        let stored = storage_timestamp(at);
        assert_eq!(stored, "2026-01-01 10:00:00");
        assert_eq!(parse_timestamp(&stored), Some(1_767_261_600));
    }
}
