//! Time utilities: lenient ISO-8601 parsing and timezone-aware calendar days.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("invalid timestamp '{0}' (expected ISO-8601, e.g. 2024-01-01T09:00:00Z)")]
    InvalidTimestamp(String),
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an IANA timezone name like "Europe/Madrid".
pub fn parse_timezone(tz: &str) -> Result<Tz, TimeError> {
    tz.trim()
        .parse()
        .map_err(|_| TimeError::InvalidTimezone(tz.to_string()))
}

/// Parse an ISO-8601-like timestamp.
///
/// RFC 3339 strings keep their offset. Offset-less date-times and bare dates
/// are taken as UTC (bare dates at midnight).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimeError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ndt.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
            return Ok(ndt.and_utc());
        }
    }
    Err(TimeError::InvalidTimestamp(s.to_string()))
}

pub fn parse_day(s: &str) -> Result<NaiveDate, TimeError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| TimeError::InvalidDate(s.to_string()))
}

/// Calendar day of `dt` as seen from `tz`.
pub fn local_day(dt: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    dt.with_timezone(tz).date_naive()
}

/// RFC 3339 in UTC, keeping sub-second digits only when present.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Serde adapter for receipt timestamps (`#[serde(with = "...")]`).
pub mod iso_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_timestamp("2024-01-01T09:00:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_offsetless_forms_as_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T09:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T09:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01 09:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-01-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TimeError::InvalidTimestamp(_))
        ));
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_local_day_crosses_midnight() {
        // 23:30 UTC is already the next day in Madrid (UTC+1 in January)
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let madrid = parse_timezone("Europe/Madrid").unwrap();
        assert_eq!(local_day(dt, &madrid), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(local_day(dt, &Tz::UTC), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_format_keeps_subseconds_only_when_present() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(format_timestamp(&whole), "2024-01-01T09:00:00Z");
        let frac = whole + chrono::Duration::milliseconds(250);
        assert_eq!(parse_timestamp(&format_timestamp(&frac)).unwrap(), frac);
    }
}
