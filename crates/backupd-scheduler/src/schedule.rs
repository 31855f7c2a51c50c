use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Day-of-week names indexed by standard cron numbering (0 and 7 = Sunday).
const WEEKDAYS: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A parsed cron expression bound to the timezone it is evaluated in.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    /// Expression as configured, before normalisation.
    expression: String,
    timezone: Tz,
    schedule: Schedule,
}

impl CronSchedule {
    /// Parse `expression` and resolve `timezone`.
    ///
    /// Both standard 5-field (`min hour dom month dow`) and seconds-first
    /// 6/7-field expressions are accepted, as are `@daily`-style shorthands.
    pub fn parse(expression: &str, timezone: &str) -> Result<Self> {
        let normalized = normalize_expression(expression)?;
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| SchedulerError::InvalidSchedule(format!("{expression:?}: {e}")))?;
        let timezone = backupd_core::display::parse_timezone(timezone)?;

        Ok(Self {
            expression: expression.trim().to_string(),
            timezone,
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire time strictly after `from`.
    ///
    /// Evaluated in the schedule's own timezone; the zoned result is
    /// converted back to UTC here so callers only ever see `DateTime<Utc>`.
    /// Inside a repeated DST hour the crate yields the earlier of two
    /// ambiguous instants, which can precede `from`; those are skipped.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .map(|dt| dt.with_timezone(&Utc))
            .find(|dt| *dt > from)
    }
}

/// Rewrite `expression` into the seconds-first form the `cron` crate parses.
///
/// 5-field expressions get a `0` seconds field prepended and their numeric
/// weekdays rewritten as names, since the crate numbers Sunday as 1 where
/// standard cron uses 0. 6/7-field expressions and `@` shorthands pass
/// through untouched.
pub fn normalize_expression(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.as_slice() {
        [shorthand] if shorthand.starts_with('@') => Ok(shorthand.to_string()),
        [minute, hour, dom, month, dow] => {
            let dow = translate_weekdays(dow)?;
            Ok(format!("0 {minute} {hour} {dom} {month} {dow}"))
        }
        _ if fields.len() == 6 || fields.len() == 7 => Ok(fields.join(" ")),
        _ => Err(SchedulerError::InvalidSchedule(format!(
            "{expression:?}: expected 5, 6 or 7 fields, got {}",
            fields.len()
        ))),
    }
}

/// Replace numeric weekdays with `SUN`..`SAT`. Step values (`*/2`) stay numeric.
///
/// The crate wants ranges in ascending `SUN`..`SAT` order, so a range ending
/// in 7 (Sunday) is split: `5-7` becomes `FRI-SAT,SUN`. Items that are not
/// purely numeric (`MON-FRI`, `L`, `2#1`) pass through untouched.
fn translate_weekdays(field: &str) -> Result<String> {
    let items = field
        .split(',')
        .map(translate_weekday_item)
        .collect::<Result<Vec<_>>>()?;
    Ok(items.join(","))
}

fn translate_weekday_item(item: &str) -> Result<String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    if range.is_empty() || !range.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return Ok(item.to_string());
    }
    let suffix = step.map(|s| format!("/{s}")).unwrap_or_default();

    let Some((lo, hi)) = range.split_once('-') else {
        return Ok(format!("{}{suffix}", weekday_name(range)?));
    };
    let (lo, hi) = (weekday_number(lo)?, weekday_number(hi)?);

    if hi != 7 || lo == 7 {
        return Ok(format!("{}-{}{suffix}", WEEKDAYS[lo], WEEKDAYS[hi]));
    }

    match step {
        None => Ok(match lo {
            0 => "SUN-SAT".to_string(),
            6 => "SAT,SUN".to_string(),
            _ => format!("{}-SAT,SUN", WEEKDAYS[lo]),
        }),
        Some(step) => {
            let step = step
                .parse::<usize>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| SchedulerError::InvalidSchedule(format!("day-of-week step {step:?}")))?;
            let mut names: Vec<&str> = Vec::new();
            for n in (lo..=7).step_by(step) {
                if !names.contains(&WEEKDAYS[n]) {
                    names.push(WEEKDAYS[n]);
                }
            }
            Ok(names.join(","))
        }
    }
}

fn weekday_number(digits: &str) -> Result<usize> {
    digits
        .parse::<usize>()
        .ok()
        .filter(|n| *n < WEEKDAYS.len())
        .ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!("day-of-week {digits:?} out of range 0-7"))
        })
}

fn weekday_name(digits: &str) -> Result<&'static str> {
    weekday_number(digits).map(|n| WEEKDAYS[n])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn five_fields_get_seconds_prefix() {
        assert_eq!(normalize_expression("0 2 * * *").unwrap(), "0 0 2 * * *");
        assert_eq!(normalize_expression("  */15 * * * *  ").unwrap(), "0 */15 * * * *");
    }

    #[test]
    fn six_and_seven_fields_pass_through() {
        assert_eq!(normalize_expression("0 0 2 * * *").unwrap(), "0 0 2 * * *");
        assert_eq!(normalize_expression("0 0 2 * * * 2030").unwrap(), "0 0 2 * * * 2030");
    }

    #[test]
    fn shorthand_passes_through() {
        assert_eq!(normalize_expression("@daily").unwrap(), "@daily");
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        assert!(matches!(
            normalize_expression("* * * *"),
            Err(SchedulerError::InvalidSchedule(_))
        ));
        assert!(matches!(normalize_expression(""), Err(SchedulerError::InvalidSchedule(_))));
    }

    #[test]
    fn weekdays_translated_to_names() {
        assert_eq!(translate_weekdays("1-5").unwrap(), "MON-FRI");
        assert_eq!(translate_weekdays("0,6").unwrap(), "SUN,SAT");
        assert_eq!(translate_weekdays("7").unwrap(), "SUN");
        assert_eq!(translate_weekdays("*").unwrap(), "*");
        assert_eq!(translate_weekdays("*/2").unwrap(), "*/2");
        assert_eq!(translate_weekdays("1-5/2").unwrap(), "MON-FRI/2");
        assert!(translate_weekdays("8").is_err());
        assert_eq!(translate_weekdays("MON-FRI").unwrap(), "MON-FRI");
    }

    #[test]
    fn ranges_ending_on_sunday_are_split() {
        assert_eq!(translate_weekdays("6-7").unwrap(), "SAT,SUN");
        assert_eq!(translate_weekdays("5-7").unwrap(), "FRI-SAT,SUN");
        assert_eq!(translate_weekdays("1-7").unwrap(), "MON-SAT,SUN");
        assert_eq!(translate_weekdays("0-7").unwrap(), "SUN-SAT");
        assert_eq!(translate_weekdays("1-7/2").unwrap(), "MON,WED,FRI,SUN");
        assert!(translate_weekdays("1-7/0").is_err());
    }

    #[test]
    fn weekend_range_with_seven_parses_and_fires() {
        // 2024-01-01 is a Monday; the first weekend day is Saturday the 6th.
        let weekends = CronSchedule::parse("0 2 * * 6-7", "UTC").unwrap();
        let saturday = weekends.next_after(at(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(saturday, at(2024, 1, 6, 2, 0, 0));
        assert_eq!(weekends.next_after(saturday).unwrap(), at(2024, 1, 7, 2, 0, 0));

        assert!(CronSchedule::parse("0 2 * * 5-7", "UTC").is_ok());
        let daily = CronSchedule::parse("0 2 * * 1-7", "UTC").unwrap();
        assert_eq!(daily.next_after(at(2024, 1, 1, 0, 0, 0)).unwrap(), at(2024, 1, 1, 2, 0, 0));
    }

    #[test]
    fn nightly_from_midnight_fires_same_day() {
        let schedule = CronSchedule::parse("0 2 * * *", "UTC").unwrap();
        let next = schedule.next_after(at(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 1, 2, 0, 0));
    }

    #[test]
    fn nightly_at_fire_time_rolls_to_next_day() {
        let schedule = CronSchedule::parse("0 2 * * *", "UTC").unwrap();
        let next = schedule.next_after(at(2024, 1, 1, 2, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 2, 2, 0, 0));
    }

    #[test]
    fn evaluated_in_configured_timezone() {
        // 00:00 UTC is 08:00 in Manila, so the next 02:00 Manila is the
        // following local day, 18:00 UTC.
        let schedule = CronSchedule::parse("0 2 * * *", "Asia/Manila").unwrap();
        let next = schedule.next_after(at(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 1, 18, 0, 0));
    }

    #[test]
    fn standard_weekday_numbering() {
        // 2024-01-06 is a Saturday.
        let weekdays = CronSchedule::parse("0 9 * * 1-5", "UTC").unwrap();
        assert_eq!(
            weekdays.next_after(at(2024, 1, 6, 0, 0, 0)).unwrap(),
            at(2024, 1, 8, 9, 0, 0)
        );

        // 2024-01-01 is a Monday; 0 means Sunday.
        let sundays = CronSchedule::parse("0 9 * * 0", "UTC").unwrap();
        assert_eq!(
            sundays.next_after(at(2024, 1, 1, 0, 0, 0)).unwrap(),
            at(2024, 1, 7, 9, 0, 0)
        );
    }

    #[test]
    fn repeated_dst_hour_never_yields_a_past_time() {
        // 2024-11-03T06:10Z is 01:10 EST, the second pass through 01:xx in New York.
        let from = at(2024, 11, 3, 6, 10, 0);

        let quarterly = CronSchedule::parse("*/15 * * * *", "America/New_York").unwrap();
        let mut cursor = from;
        for _ in 0..3 {
            let next = quarterly.next_after(cursor).unwrap();
            assert!(next > cursor, "{next} is not after {cursor}");
            assert!(next - cursor <= chrono::Duration::hours(1), "{next} skipped too far");
            cursor = next;
        }

        let nightly = CronSchedule::parse("30 1 * * *", "America/New_York").unwrap();
        let next = nightly.next_after(from).unwrap();
        assert!(next > from);
        assert!(next <= at(2024, 11, 4, 6, 30, 0));
    }

    #[test]
    fn next_fire_is_in_the_future() {
        let schedule = CronSchedule::parse("*/5 * * * *", "UTC").unwrap();
        let now = Utc::now();
        assert!(schedule.next_after(now).unwrap() > now);
    }

    #[test]
    fn keeps_configured_expression() {
        let schedule = CronSchedule::parse(" 0 2 * * * ", "Europe/Berlin").unwrap();
        assert_eq!(schedule.expression(), "0 2 * * *");
        assert_eq!(schedule.timezone(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn malformed_expression_is_invalid_schedule() {
        let err = CronSchedule::parse("not a cron", "UTC").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));

        let err = CronSchedule::parse("61 * * * *", "UTC").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
    }

    #[test]
    fn unknown_timezone_is_invalid_timezone() {
        let err = CronSchedule::parse("0 2 * * *", "Nowhere/Special").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTimezone(ref tz) if tz == "Nowhere/Special"));
    }
}
