//! Timestamp rendering for logs and status responses.
//!
//! Display only. Scheduling decisions never go through these helpers; the
//! cron schedule carries its own evaluation timezone.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

use crate::error::{CoreError, Result};

/// Placeholder rendered when a timestamp is absent.
pub const NOT_AVAILABLE: &str = "N/A";

/// Parse an IANA timezone name such as `"Asia/Manila"`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CoreError::Timezone(name.to_string()))
}

/// `2024-06-15T10:00:00.000Z`
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `Jun 15, 2024, 06:00:00 PM` in the given zone (12-hour clock).
pub fn format_local(ts: DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz)
        .format("%b %d, %Y, %I:%M:%S %p")
        .to_string()
}

/// Like [`format_local`], rendering [`NOT_AVAILABLE`] for `None`.
pub fn format_local_or_na(ts: Option<DateTime<Utc>>, tz: &Tz) -> String {
    ts.map(|t| format_local(t, tz))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn manila() -> Tz {
        parse_timezone("Asia/Manila").unwrap()
    }

    #[test]
    fn manila_is_eight_hours_ahead() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(format_local(ts, &manila()), "Jun 15, 2024, 06:00:00 PM");
    }

    #[test]
    fn local_rollover_into_next_day() {
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 20, 5, 9).unwrap();
        assert_eq!(format_local(ts, &manila()), "Jan 01, 2025, 04:05:09 AM");
    }

    #[test]
    fn midnight_renders_as_twelve_am() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap();
        assert_eq!(format_local(ts, &manila()), "Mar 02, 2024, 12:00:00 AM");
    }

    #[test]
    fn utc_has_millis_and_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(format_utc(ts), "2024-06-15T10:00:00.000Z");
    }

    #[test]
    fn missing_timestamp_is_na() {
        assert_eq!(format_local_or_na(None, &manila()), "N/A");
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let err = parse_timezone("Mars/Olympus_Mons").unwrap_err();
        assert!(matches!(err, CoreError::Timezone(ref name) if name == "Mars/Olympus_Mons"));
    }
}
