//! Cron expression parser
//!
//! Supports standard 5-field cron syntax:
//! ```text
//! ┌───────────── minute (0-59)
//! │ ┌───────────── hour (0-23)
//! │ │ ┌───────────── day of month (1-31)
//! │ │ │ ┌───────────── month (1-12)
//! │ │ │ │ ┌───────────── day of week (0-6, 0 and 7 = Sunday)
//! │ │ │ │ │
//! * * * * *
//! ```
//!
//! Special characters:
//! - `*` - any value
//! - `,` - value list separator (e.g., `1,3,5`)
//! - `-` - range (e.g., `1-5`)
//! - `/` - step (e.g., `*/5` or `0-30/5`)
//!
//! When both day-of-month and day-of-week are restricted (neither written
//! as `*`), the day match is the OR of the two, per classic crontab rules.

use crate::types::ParseError;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minutes scanned by `next_after` before giving up: four years, enough
/// to cover leap-day-only schedules.
const NEXT_SEARCH_HORIZON: u32 = 4 * 366 * 24 * 60;

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronExpression {
    /// Original expression string
    pub expression: String,
    /// Allowed minutes (0-59)
    minutes: BTreeSet<u32>,
    /// Allowed hours (0-23)
    hours: BTreeSet<u32>,
    /// Allowed days of month (1-31)
    days: BTreeSet<u32>,
    /// Allowed months (1-12)
    months: BTreeSet<u32>,
    /// Allowed days of week (0-6, 0=Sunday; 7 normalized to 0 at parse)
    weekdays: BTreeSet<u32>,
    /// Day-of-month field written as something other than `*`
    days_restricted: bool,
    /// Day-of-week field written as something other than `*`
    weekdays_restricted: bool,
}

impl CronExpression {
    /// Parse a cron expression string
    ///
    /// Leading and trailing whitespace is ignored and any run of
    /// whitespace separates fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use cronbeat::CronExpression;
    ///
    /// // Every 5 minutes
    /// let expr = CronExpression::parse("*/5 * * * *").unwrap();
    ///
    /// // Every day at 2:30 AM
    /// let expr = CronExpression::parse("30 2 * * *").unwrap();
    ///
    /// // Noon on the 13th, or any Friday
    /// let expr = CronExpression::parse("0 12 13 * 5").unwrap();
    /// ```
    pub fn parse(expression: &str) -> Result<Self, ParseError> {
        let expression = expression.trim();
        let parts: Vec<&str> = expression.split_whitespace().collect();

        if parts.len() != 5 {
            return Err(ParseError::FieldCount(parts.len()));
        }

        let minutes = parse_field(parts[0], 0, 59, "minute")?;
        let hours = parse_field(parts[1], 0, 23, "hour")?;
        let days = parse_field(parts[2], 1, 31, "day")?;
        let months = parse_field(parts[3], 1, 12, "month")?;

        // Day-of-week accepts 0-7; 7 is an alias for Sunday.
        let mut weekdays = parse_field(parts[4], 0, 7, "weekday")?;
        if weekdays.remove(&7) {
            weekdays.insert(0);
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
            days,
            months,
            weekdays,
            days_restricted: parts[2] != "*",
            weekdays_restricted: parts[4] != "*",
        })
    }

    /// Check whether this expression fires at the given instant
    ///
    /// Seconds are ignored; firing is decided at minute granularity.
    pub fn fires(&self, instant: &DateTime<Utc>) -> bool {
        if !self.minutes.contains(&instant.minute())
            || !self.hours.contains(&instant.hour())
            || !self.months.contains(&instant.month())
        {
            return false;
        }

        let day_matches = self.days.contains(&instant.day());
        let weekday_matches = self
            .weekdays
            .contains(&instant.weekday().num_days_from_sunday());

        if self.days_restricted && self.weekdays_restricted {
            day_matches || weekday_matches
        } else {
            day_matches && weekday_matches
        }
    }

    /// Smallest instant strictly after `after`, at minute granularity,
    /// for which this expression fires
    ///
    /// Returns `None` when no match exists within the search horizon
    /// (e.g. `0 0 31 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = truncate_to_minute(after + Duration::minutes(1))?;

        for _ in 0..NEXT_SEARCH_HORIZON {
            if self.fires(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }

        None
    }
}

/// Drop the seconds and sub-second components of an instant
fn truncate_to_minute(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(
        instant.year(),
        instant.month(),
        instant.day(),
        instant.hour(),
        instant.minute(),
        0,
    )
    .single()
}

/// Parse a single cron field into its allowed-value set
fn parse_field(
    field: &str,
    min: u32,
    max: u32,
    name: &'static str,
) -> Result<BTreeSet<u32>, ParseError> {
    if field.is_empty() {
        return Err(ParseError::EmptyField { field: name });
    }

    let mut values = BTreeSet::new();

    for part in field.split(',') {
        if part.is_empty() {
            return Err(ParseError::EmptyField { field: name });
        }

        let syntax = |token: &str| ParseError::Syntax {
            field: name,
            token: token.to_string(),
        };

        // Split off the step, if any (e.g. */5 or 0-30/5)
        let (range_part, step) = match part.split_once('/') {
            Some((range_part, step_str)) => {
                let step: u32 = step_str.parse().map_err(|_| syntax(part))?;
                if step == 0 {
                    return Err(syntax(part));
                }
                (range_part, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((start_str, end_str)) = range_part.split_once('-') {
            let start: u32 = start_str.parse().map_err(|_| syntax(part))?;
            let end: u32 = end_str.parse().map_err(|_| syntax(part))?;
            if start > end {
                return Err(syntax(part));
            }
            (start, end)
        } else {
            let value: u32 = range_part.parse().map_err(|_| syntax(part))?;
            (value, value)
        };

        for value in [start, end] {
            if value < min || value > max {
                return Err(ParseError::OutOfRange {
                    field: name,
                    value,
                    min,
                    max,
                });
            }
        }

        let mut current = start;
        while current <= end {
            values.insert(current);
            current += step;
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_minute() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 60);
        assert_eq!(expr.hours.len(), 24);
        assert_eq!(expr.days.len(), 31);
        assert_eq!(expr.months.len(), 12);
        assert_eq!(expr.weekdays.len(), 7);
        assert!(!expr.days_restricted);
        assert!(!expr.weekdays_restricted);
    }

    #[test]
    fn test_parse_trims_and_collapses_whitespace() {
        let expr = CronExpression::parse("  30   2 * *  1 ").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([30]));
        assert_eq!(expr.hours, BTreeSet::from([2]));
        assert_eq!(expr.weekdays, BTreeSet::from([1]));
    }

    #[test]
    fn test_parse_step() {
        let expr = CronExpression::parse("*/5 * * * *").unwrap();
        assert_eq!(
            expr.minutes,
            BTreeSet::from([0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55])
        );
    }

    #[test]
    fn test_parse_range_with_step() {
        let expr = CronExpression::parse("0-30/10 * * * *").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([0, 10, 20, 30]));
    }

    #[test]
    fn test_parse_stepped_range_caps_at_end() {
        // 1, 1+4=5, 9, 13 — capped at 14
        let expr = CronExpression::parse("1-14/4 * * * *").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([1, 5, 9, 13]));
    }

    #[test]
    fn test_parse_mixed_list() {
        let expr = CronExpression::parse("1,10-12,*/30 * * * *").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([0, 1, 10, 11, 12, 30]));
    }

    #[test]
    fn test_parse_weekday_seven_is_sunday() {
        let expr = CronExpression::parse("0 0 * * 7").unwrap();
        assert_eq!(expr.weekdays, BTreeSet::from([0]));

        let expr = CronExpression::parse("0 0 * * 5-7").unwrap();
        assert_eq!(expr.weekdays, BTreeSet::from([0, 5, 6]));
    }

    #[test]
    fn test_parse_empty_expression() {
        assert_eq!(
            CronExpression::parse(""),
            Err(ParseError::FieldCount(0)),
            "empty input is a field-count error"
        );
        assert_eq!(CronExpression::parse("   "), Err(ParseError::FieldCount(0)));
    }

    #[test]
    fn test_parse_wrong_field_count() {
        assert_eq!(
            CronExpression::parse("* * *"),
            Err(ParseError::FieldCount(3))
        );
        assert_eq!(
            CronExpression::parse("* * * * * *"),
            Err(ParseError::FieldCount(6))
        );
    }

    #[test]
    fn test_parse_value_out_of_range() {
        assert_eq!(
            CronExpression::parse("60 * * * *"),
            Err(ParseError::OutOfRange {
                field: "minute",
                value: 60,
                min: 0,
                max: 59,
            })
        );
        assert!(CronExpression::parse("* 24 * * *").is_err());
        assert!(CronExpression::parse("* * 0 * *").is_err());
        assert!(CronExpression::parse("* * * 13 *").is_err());
        assert!(CronExpression::parse("* * * * 8").is_err());
    }

    #[test]
    fn test_parse_zero_step() {
        let result = CronExpression::parse("*/0 * * * *");
        assert!(matches!(result, Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn test_parse_inverted_range() {
        let result = CronExpression::parse("30-10 * * * *");
        assert!(matches!(result, Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn test_parse_garbage_tokens() {
        assert!(matches!(
            CronExpression::parse("abc * * * *"),
            Err(ParseError::Syntax { .. })
        ));
        assert!(matches!(
            CronExpression::parse("1-x * * * *"),
            Err(ParseError::Syntax { .. })
        ));
        assert!(matches!(
            CronExpression::parse("*/y * * * *"),
            Err(ParseError::Syntax { .. })
        ));
    }

    #[test]
    fn test_parse_empty_list_item() {
        let result = CronExpression::parse("1,,2 * * * *");
        assert_eq!(result, Err(ParseError::EmptyField { field: "minute" }));
    }

    #[test]
    fn test_fires_every_minute() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        let dt = Utc.with_ymd_and_hms(2026, 8, 6, 14, 37, 0).unwrap();
        assert!(expr.fires(&dt));
    }

    #[test]
    fn test_fires_ignores_seconds() {
        let expr = CronExpression::parse("30 14 * * *").unwrap();
        let dt = Utc.with_ymd_and_hms(2026, 8, 6, 14, 30, 45).unwrap();
        assert!(expr.fires(&dt));
    }

    #[test]
    fn test_fires_specific_weekday() {
        let expr = CronExpression::parse("30 14 * * 1").unwrap();
        // Monday 2026-02-02 at 14:30
        let monday = Utc.with_ymd_and_hms(2026, 2, 2, 14, 30, 0).unwrap();
        assert!(expr.fires(&monday));

        // Same time on Tuesday
        let tuesday = Utc.with_ymd_and_hms(2026, 2, 3, 14, 30, 0).unwrap();
        assert!(!expr.fires(&tuesday));
    }

    #[test]
    fn test_fires_day_or_weekday_when_both_restricted() {
        // Noon on the 13th, or noon on any Friday
        let expr = CronExpression::parse("0 12 13 * 5").unwrap();

        // Friday 2026-02-13: both match
        let friday_13th = Utc.with_ymd_and_hms(2026, 2, 13, 12, 0, 0).unwrap();
        assert!(expr.fires(&friday_13th));

        // Friday 2026-02-20: weekday matches, day does not
        let plain_friday = Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap();
        assert!(expr.fires(&plain_friday));

        // Friday 2026-03-13: the 13th again
        let friday_march = Utc.with_ymd_and_hms(2026, 3, 13, 12, 0, 0).unwrap();
        assert!(expr.fires(&friday_march));

        // Saturday 2026-02-14: neither matches
        let saturday = Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap();
        assert!(!expr.fires(&saturday));
    }

    #[test]
    fn test_fires_day_and_weekday_when_one_unrestricted() {
        // Day restricted, weekday wildcard: AND semantics
        let expr = CronExpression::parse("0 12 13 * *").unwrap();
        let not_the_13th = Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap();
        assert!(!expr.fires(&not_the_13th));

        // Weekday restricted, day wildcard
        let expr = CronExpression::parse("0 12 * * 5").unwrap();
        let friday = Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap();
        assert!(expr.fires(&friday));
        let saturday = Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap();
        assert!(!expr.fires(&saturday));
    }

    #[test]
    fn test_next_after_top_of_hour() {
        let expr = CronExpression::parse("0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 5, 10, 30, 0).unwrap();
        let next = expr.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 5, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_next_after_is_strictly_greater() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        let exactly_on_minute = Utc.with_ymd_and_hms(2026, 2, 5, 10, 30, 0).unwrap();
        let next = expr.next_after(exactly_on_minute).unwrap();
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2026, 2, 5, 10, 31, 0).unwrap()
        );
    }

    #[test]
    fn test_next_after_truncates_seconds() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        let mid_minute = Utc.with_ymd_and_hms(2026, 2, 5, 10, 30, 45).unwrap();
        let next = expr.next_after(mid_minute).unwrap();
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2026, 2, 5, 10, 31, 0).unwrap()
        );
    }

    #[test]
    fn test_next_after_rolls_to_next_day() {
        let expr = CronExpression::parse("0 2 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 5, 10, 0, 0).unwrap();
        let next = expr.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 6, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_next_after_strictly_increasing() {
        let expr = CronExpression::parse("*/15 9-17 * * 1-5").unwrap();
        let mut t = Utc.with_ymd_and_hms(2026, 8, 6, 0, 0, 0).unwrap();
        for _ in 0..50 {
            let next = expr.next_after(t).unwrap();
            assert!(next > t);
            assert!(expr.fires(&next));
            t = next;
        }
    }

    #[test]
    fn test_next_after_unsatisfiable() {
        // February 31st never exists
        let expr = CronExpression::parse("0 0 31 2 *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(expr.next_after(now).is_none());
    }

    #[test]
    fn test_next_after_leap_day() {
        let expr = CronExpression::parse("0 0 29 2 *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = expr.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2028, 2, 29, 0, 0, 0).unwrap());
    }
}
