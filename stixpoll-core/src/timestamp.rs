//! Timestamp codec
//!
//! TAXII and STIX carry ISO8601-ish timestamps with every imaginable
//! variation. Internally everything is milliseconds since the Unix epoch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use thiserror::Error;

/// Timestamp parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed timestamp: {0:?}")]
pub struct TimestampError(pub String);

/// Output precision for [`format`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// `2014-12-19T00:00:00Z` (TAXII 1.1 poll framing)
    Seconds,
    /// `2014-12-19T00:00:00.000Z` (STIX 2)
    Millis,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Parse a timestamp into milliseconds since the epoch
///
/// Timestamps without an explicit offset are taken as UTC.
pub fn parse(text: &str) -> Result<i64, TimestampError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TimestampError(text.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp_millis());
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Ok(dt.timestamp_millis());
        }
    }

    // Trailing "Z" with a space separator or without seconds
    let naive_text = text.strip_suffix('Z').unwrap_or(text);
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_text, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(naive_text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }

    Err(TimestampError(text.to_string()))
}

/// Format milliseconds since the epoch as a UTC timestamp
///
/// With [`Precision::Seconds`] the sub-second part is truncated.
pub fn format(millis: i64, precision: Precision) -> String {
    let dt = to_datetime(millis);
    match precision {
        Precision::Seconds => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        Precision::Millis => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Convert milliseconds since the epoch to a UTC datetime
///
/// Out of range values clamp to the epoch.
pub fn to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Truncate to whole seconds
pub fn floor_seconds(millis: i64) -> i64 {
    millis.div_euclid(1_000) * 1_000
}

/// Truncate to whole minutes
pub fn floor_minutes(millis: i64) -> i64 {
    millis.div_euclid(60_000) * 60_000
}
