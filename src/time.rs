use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serializer;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses an ISO-8601 timestamp and normalises it to UTC.
///
/// Offset-aware values are converted; naive values and bare dates are taken
/// to already be UTC. Anything unparseable yields `None` so the caller can
/// drop the record instead of failing the run.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|parsed| parsed.and_utc())
}

/// ISO-8601 with an explicit `+00:00` offset.
pub fn to_iso(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

pub fn serialize_iso<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&to_iso(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_offset_timestamps_into_utc() {
        let parsed = parse_utc("2024-07-01T14:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn naive_timestamps_are_treated_as_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_utc("2024-07-01T12:00").unwrap(), expected);
        assert_eq!(parse_utc("2024-07-01T12:00:00").unwrap(), expected);
        assert_eq!(parse_utc("2024-07-01 12:00:00").unwrap(), expected);
    }

    #[test]
    fn bare_dates_start_at_midnight() {
        let parsed = parse_utc("2024-07-01").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_utc("").is_none());
        assert!(parse_utc("yesterday").is_none());
        assert!(parse_utc("2024-13-01T00:00:00").is_none());
    }

    #[test]
    fn iso_output_uses_explicit_offset() {
        let value = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(to_iso(&value), "2024-07-01T12:00:00+00:00");
    }
}
