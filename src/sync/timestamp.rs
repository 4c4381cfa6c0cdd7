use chrono::{Duration, NaiveDateTime};

use super::error::SyncError;

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Normalize a tracker or board timestamp to a zone-naive
/// `YYYY-MM-DDTHH:MM:SS` string.
///
/// Fractional seconds and any zone suffix (`.000+0200`, `.123456Z`, bare `Z`,
/// `+02:00`) are stripped. When the remainder parses, it is re-formatted so
/// every field is zero-padded; lexicographic order on the result is
/// chronological order, which is what the resolver compares. Inputs that do
/// not parse are returned cleaned but otherwise untouched, for a degraded
/// string-only comparison. Idempotent.
pub fn normalize(raw: &str) -> String {
    let cleaned = strip_suffix(raw.trim());
    match parse(&cleaned) {
        Some(dt) => dt.format(NAIVE_FORMAT).to_string(),
        None => cleaned,
    }
}

/// Parse a normalized timestamp for duration arithmetic. Callers fall back to
/// string comparison when this returns `None`.
pub fn parse(normalized: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(normalized, NAIVE_FORMAT).ok()
}

/// Convert a board UTC timestamp into the tracker's local time by applying
/// the configured offset, then normalize. Board timestamps are always UTC;
/// tracker timestamps are reported in local time, so this is what makes the
/// two comparable.
pub fn to_local(utc: &str, offset_hours: i64) -> Result<String, SyncError> {
    let cleaned = strip_suffix(utc.trim());
    let dt = parse(&cleaned).ok_or_else(|| SyncError::TimestampParse {
        raw: utc.to_string(),
    })?;
    let shifted = dt + Duration::hours(offset_hours);
    Ok(shifted.format(NAIVE_FORMAT).to_string())
}

fn strip_suffix(value: &str) -> String {
    // The date part also contains '-', so only scan for fractional seconds
    // and zone markers after the 'T'.
    let Some(t) = value.find('T') else {
        return value.to_string();
    };
    let time_start = t + 1;
    let end = value[time_start..]
        .find(|c| matches!(c, '.' | '+' | '-' | 'Z' | 'z' | ' '))
        .map(|i| time_start + i)
        .unwrap_or(value.len());
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_milliseconds_and_offset() {
        assert_eq!(
            normalize("2025-05-09T12:05:52.000+0200"),
            "2025-05-09T12:05:52"
        );
    }

    #[test]
    fn strips_fractional_utc_suffix() {
        assert_eq!(
            normalize("2025-05-09T12:05:52.123456Z"),
            "2025-05-09T12:05:52"
        );
    }

    #[test]
    fn strips_bare_zulu_and_colon_offset() {
        assert_eq!(normalize("2025-05-09T12:05:52Z"), "2025-05-09T12:05:52");
        assert_eq!(
            normalize("2025-05-09T12:05:52+02:00"),
            "2025-05-09T12:05:52"
        );
    }

    #[test]
    fn negative_offset_is_not_confused_with_date_dashes() {
        assert_eq!(
            normalize("2025-05-09T12:05:52-0700"),
            "2025-05-09T12:05:52"
        );
    }

    #[test]
    fn repads_single_digit_fields() {
        // Unpadded hours would break lexicographic ordering.
        assert_eq!(normalize("2025-05-09T9:05:52"), "2025-05-09T09:05:52");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("2025-05-09T12:05:52.000+0200");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn unparseable_input_is_returned_cleaned() {
        assert_eq!(normalize("not a timestamp"), "not a timestamp");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn to_local_applies_offset() {
        let local = to_local("2025-05-09T23:30:00Z", 2).unwrap();
        assert_eq!(local, "2025-05-10T01:30:00");
        let behind = to_local("2025-05-09T01:30:00Z", -5).unwrap();
        assert_eq!(behind, "2025-05-08T20:30:00");
    }

    #[test]
    fn to_local_rejects_garbage() {
        assert!(to_local("garbage", 2).is_err());
    }

    #[test]
    fn parse_roundtrips_normalized_form() {
        let dt = parse("2025-05-09T12:05:52").unwrap();
        assert_eq!(dt.format("%Y-%m-%dT%H:%M:%S").to_string(), "2025-05-09T12:05:52");
    }
}
