//! Recurring schedule specifications.
//!
//! Two forms are accepted: a five-field cron expression
//! (`minute hour day-of-month month day-of-week`, evaluated in UTC) and a
//! fixed interval written as `every <n><s|m|h|d>`.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use thiserror::Error;

/// How far ahead `next_after` searches before giving up on a cron expression.
const SEARCH_HORIZON_DAYS: i64 = 366;

/// Longest accepted interval, the same horizon cron lookups use.
const MAX_INTERVAL_SECS: u64 = SEARCH_HORIZON_DAYS as u64 * 86_400;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule expression is empty")]
    Empty,
    #[error("cron expression needs 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field `{value}`")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} value {value} is outside {min}..={max}")]
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },
    #[error("invalid interval `{0}`; expected `every <n><s|m|h|d>` with n > 0 and at most 366 days")]
    InvalidInterval(String),
}

#[derive(Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7 };

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(ScheduleError::Empty);
        }
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ScheduleError::FieldCount(parts.len()));
        }

        let (minutes, _) = parse_field(parts[0], MINUTE)?;
        let (hours, _) = parse_field(parts[1], HOUR)?;
        let (days_of_month, day_of_month_restricted) = parse_field(parts[2], DAY_OF_MONTH)?;
        let (months, _) = parse_field(parts[3], MONTH)?;
        let (raw_days_of_week, day_of_week_restricted) = parse_field(parts[4], DAY_OF_WEEK)?;
        // 7 is an alias for Sunday.
        let days_of_week = raw_days_of_week.into_iter().map(|day| day % 7).collect();

        Ok(Self {
            expression: parts.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            day_of_month_restricted,
            day_of_week_restricted,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = truncate_to_minute(after) + chrono::Duration::minutes(1);
        let start_date = start.date_naive();

        for offset in 0..=SEARCH_HORIZON_DAYS {
            let date = start_date + chrono::Duration::days(offset);
            if !self.matches_date(date) {
                continue;
            }
            let (floor_hour, floor_minute) =
                if offset == 0 { (start.hour(), start.minute()) } else { (0, 0) };

            for hour in self.hours.range(floor_hour..) {
                let minute_floor = if *hour == floor_hour { floor_minute } else { 0 };
                if let Some(minute) = self.minutes.range(minute_floor..).next() {
                    let naive = date.and_hms_opt(*hour, *minute, 0)?;
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
        }
        None
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        if !self.months.contains(&date.month()) {
            return false;
        }
        let day_of_month = self.days_of_month.contains(&date.day());
        let day_of_week = self.days_of_week.contains(&date.weekday().num_days_from_sunday());
        match (self.day_of_month_restricted, self.day_of_week_restricted) {
            (true, true) => day_of_month || day_of_week,
            (true, false) => day_of_month,
            (false, true) => day_of_week,
            (false, false) => true,
        }
    }
}

fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.with_second(0).and_then(|value| value.with_nanosecond(0)).unwrap_or(instant)
}

/// Returns the matching values and whether the field narrows the range at all.
fn parse_field(field: &str, spec: FieldSpec) -> Result<(BTreeSet<u32>, bool), ScheduleError> {
    let mut values = BTreeSet::new();
    let mut restricted = false;

    for part in field.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid(spec, field));
        }
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid(spec, field))?;
                if step == 0 {
                    return Err(invalid(spec, field));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            if step > 1 {
                restricted = true;
            }
            (spec.min, spec.max)
        } else {
            restricted = true;
            match range.split_once('-') {
                Some((low, high)) => (parse_value(low, spec, field)?, parse_value(high, spec, field)?),
                None => {
                    let value = parse_value(range, spec, field)?;
                    // `N/step` runs from N to the end of the range.
                    if step > 1 {
                        (value, spec.max)
                    } else {
                        (value, value)
                    }
                }
            }
        };
        if start > end {
            return Err(invalid(spec, field));
        }
        values.extend((start..=end).step_by(step as usize));
    }

    Ok((values, restricted))
}

fn parse_value(raw: &str, spec: FieldSpec, field: &str) -> Result<u32, ScheduleError> {
    let value: u32 = raw.trim().parse().map_err(|_| invalid(spec, field))?;
    if value < spec.min || value > spec.max {
        return Err(ScheduleError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

fn invalid(spec: FieldSpec, field: &str) -> ScheduleError {
    ScheduleError::InvalidField { field: spec.name, value: field.to_owned() }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleSpec {
    Cron(CronSchedule),
    Interval(Duration),
}

impl ScheduleSpec {
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ScheduleError::Empty);
        }
        match trimmed.strip_prefix("every") {
            Some(rest) if rest.starts_with(char::is_whitespace) => {
                parse_interval(rest.trim()).map(Self::Interval)
            }
            _ => CronSchedule::parse(trimmed).map(Self::Cron),
        }
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(cron) => cron.next_after(after),
            Self::Interval(period) => {
                chrono::Duration::from_std(*period).ok().and_then(|step| after.checked_add_signed(step))
            }
        }
    }

    /// Delay from `now` until the next firing.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Interval(period) => Some(*period),
            Self::Cron(cron) => cron.next_after(now).and_then(|next| (next - now).to_std().ok()),
        }
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(cron) => f.write_str(cron.expression()),
            Self::Interval(period) => write!(f, "every {}s", period.as_secs()),
        }
    }
}

fn parse_interval(raw: &str) -> Result<Duration, ScheduleError> {
    let error = || ScheduleError::InvalidInterval(raw.to_owned());
    let split = raw.find(|ch: char| !ch.is_ascii_digit()).ok_or_else(error)?;
    let (amount, unit) = raw.split_at(split);
    let amount: u64 = amount.parse().map_err(|_| error())?;
    if amount == 0 {
        return Err(error());
    }
    let seconds = match unit.trim() {
        "s" => amount,
        "m" => amount.checked_mul(60).ok_or_else(error)?,
        "h" => amount.checked_mul(3_600).ok_or_else(error)?,
        "d" => amount.checked_mul(86_400).ok_or_else(error)?,
        _ => return Err(error()),
    };
    if seconds > MAX_INTERVAL_SECS {
        return Err(error());
    }
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};

    use super::{CronSchedule, ScheduleError, ScheduleSpec};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("valid timestamp")
    }

    #[test]
    fn every_other_day_at_two_fires_on_odd_days() {
        let cron = CronSchedule::parse("0 2 */2 * *").expect("parse");
        assert_eq!(cron.next_after(at(2026, 3, 1, 1, 0)), Some(at(2026, 3, 1, 2, 0)));
        assert_eq!(cron.next_after(at(2026, 3, 1, 2, 0)), Some(at(2026, 3, 3, 2, 0)));
        // 31 is odd, then the month rolls over to 1.
        assert_eq!(cron.next_after(at(2026, 3, 30, 5, 0)), Some(at(2026, 3, 31, 2, 0)));
        assert_eq!(cron.next_after(at(2026, 3, 31, 2, 30)), Some(at(2026, 4, 1, 2, 0)));
    }

    #[test]
    fn next_after_is_strictly_later_and_minute_aligned() {
        let cron = CronSchedule::parse("*/15 * * * *").expect("parse");
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 15, 42).single().expect("valid");
        assert_eq!(cron.next_after(after), Some(at(2026, 2, 22, 10, 30)));
    }

    #[test]
    fn ranges_lists_and_weekdays() {
        let cron = CronSchedule::parse("0,30 9-10 * * 1-5").expect("parse");
        // 2026-02-21 is a Saturday.
        assert_eq!(cron.next_after(at(2026, 2, 21, 12, 0)), Some(at(2026, 2, 23, 9, 0)));
        assert_eq!(cron.next_after(at(2026, 2, 23, 9, 0)), Some(at(2026, 2, 23, 9, 30)));
        assert_eq!(cron.next_after(at(2026, 2, 23, 10, 30)), Some(at(2026, 2, 24, 9, 0)));

        let sunday = CronSchedule::parse("0 0 * * 7").expect("parse");
        assert_eq!(sunday.next_after(at(2026, 2, 21, 12, 0)), Some(at(2026, 2, 22, 0, 0)));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(CronSchedule::parse(""), Err(ScheduleError::Empty));
        assert_eq!(CronSchedule::parse("0 2 * *"), Err(ScheduleError::FieldCount(4)));
        assert!(matches!(
            CronSchedule::parse("61 * * * *"),
            Err(ScheduleError::OutOfRange { field: "minute", value: 61, .. })
        ));
        assert!(matches!(
            CronSchedule::parse("*/0 * * * *"),
            Err(ScheduleError::InvalidField { field: "minute", .. })
        ));
        assert!(matches!(
            CronSchedule::parse("0 5-2 * * *"),
            Err(ScheduleError::InvalidField { field: "hour", .. })
        ));
    }

    #[test]
    fn impossible_date_yields_no_next_run() {
        let cron = CronSchedule::parse("0 0 31 2 *").expect("parse");
        assert_eq!(cron.next_after(at(2026, 1, 1, 0, 0)), None);
    }

    #[test]
    fn interval_specs_parse_units() {
        assert_eq!(ScheduleSpec::parse("every 30m"), Ok(ScheduleSpec::Interval(Duration::from_secs(1_800))));
        assert_eq!(ScheduleSpec::parse("every 2h"), Ok(ScheduleSpec::Interval(Duration::from_secs(7_200))));
        assert_eq!(ScheduleSpec::parse("every 45s"), Ok(ScheduleSpec::Interval(Duration::from_secs(45))));
        assert!(matches!(ScheduleSpec::parse("every 0m"), Err(ScheduleError::InvalidInterval(_))));
        assert!(matches!(ScheduleSpec::parse("every 5w"), Err(ScheduleError::InvalidInterval(_))));
        assert!(matches!(ScheduleSpec::parse("0 2 */2 * *"), Ok(ScheduleSpec::Cron(_))));
    }

    #[test]
    fn intervals_longer_than_a_year_are_rejected() {
        assert_eq!(
            ScheduleSpec::parse("every 366d"),
            Ok(ScheduleSpec::Interval(Duration::from_secs(366 * 86_400)))
        );
        assert!(matches!(ScheduleSpec::parse("every 367d"), Err(ScheduleError::InvalidInterval(_))));
        assert!(matches!(
            ScheduleSpec::parse("every 1000000000d"),
            Err(ScheduleError::InvalidInterval(_))
        ));
    }

    #[test]
    fn interval_next_after_does_not_overflow() {
        let spec = ScheduleSpec::Interval(Duration::from_secs(3_600));
        assert_eq!(spec.next_after(at(2026, 3, 1, 1, 0)), Some(at(2026, 3, 1, 2, 0)));
        assert_eq!(spec.next_after(DateTime::<Utc>::MAX_UTC), None);
    }

    #[test]
    fn delay_from_counts_to_next_cron_match() {
        let spec = ScheduleSpec::parse("0 2 * * *").expect("parse");
        assert_eq!(spec.delay_from(at(2026, 3, 1, 1, 0)), Some(Duration::from_secs(3_600)));
        assert_eq!(spec.to_string(), "0 2 * * *");
    }
}
