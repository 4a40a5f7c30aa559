use std::str::FromStr;

use strum::{Display, EnumString};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, Date, Duration, Month,
    OffsetDateTime, UtcOffset,
};

use super::DomainError;

/// All wall-clock arithmetic happens in one fixed reference zone. Asia/Taipei
/// has had a constant +08:00 offset since 1979, so a fixed offset suffices.
pub const TRACKING_OFFSET: UtcOffset = match UtcOffset::from_hms(8, 0, 0) {
    Ok(offset) => offset,
    Err(_) => panic!("invalid tracking offset"),
};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// A named aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Period {
    Week,
    Month,
    Year,
}

impl Period {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        Period::from_str(s).map_err(|_| DomainError::InvalidPeriod(s.to_string()))
    }
}

/// A half-open time window `[start, end)` plus its length in week-equivalents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodBounds {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    /// Interval length divided by one week; normalizes weekly targets to the
    /// window length.
    pub scale: f64,
}

/// Window for a named period containing `now`.
pub fn bounds(period: Period, now: OffsetDateTime) -> PeriodBounds {
    let today = now.to_offset(TRACKING_OFFSET).date();
    match period {
        Period::Week => {
            let start = day_start(week_start(today));
            PeriodBounds {
                start,
                end: start + Duration::weeks(1),
                scale: 1.0,
            }
        }
        Period::Month => {
            let first = first_of_month(today.year(), today.month());
            let next = match today.month() {
                Month::December => first_of_month(today.year() + 1, Month::January),
                month => first_of_month(today.year(), month.next()),
            };
            span(first, next)
        }
        Period::Year => span(
            first_of_month(today.year(), Month::January),
            first_of_month(today.year() + 1, Month::January),
        ),
    }
}

/// Window for an inclusive calendar-date range. The exclusive end is the
/// midnight following `end_date`.
pub fn custom_bounds(start_date: &str, end_date: &str) -> Result<PeriodBounds, DomainError> {
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;
    if end < start {
        return Err(DomainError::InvalidInput(
            "endDate must not be before startDate".to_string(),
        ));
    }
    Ok(span(start, end + Duration::days(1)))
}

/// Monday of the week containing `now`, as a date in the tracking zone.
pub fn week_start_of(now: OffsetDateTime) -> Date {
    week_start(now.to_offset(TRACKING_OFFSET).date())
}

/// Midnight at the start of `date` in the tracking zone.
pub fn day_start(date: Date) -> OffsetDateTime {
    date.midnight().assume_offset(TRACKING_OFFSET)
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).expect("date formats with Y-M-D")
}

fn parse_date(s: &str) -> Result<Date, DomainError> {
    Date::parse(s, DATE_FORMAT).map_err(|_| DomainError::InvalidDateFormat(s.to_string()))
}

fn week_start(date: Date) -> Date {
    date - Duration::days(date.weekday().number_days_from_monday() as i64)
}

fn first_of_month(year: i32, month: Month) -> Date {
    Date::from_calendar_date(year, month, 1).expect("day 1 exists in every month")
}

fn span(start_date: Date, end_date: Date) -> PeriodBounds {
    let days = (end_date - start_date).whole_days();
    PeriodBounds {
        start: day_start(start_date),
        end: day_start(end_date),
        scale: days as f64 / 7.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn week_bounds_start_monday_and_span_seven_days() {
        // 2025-08-20 is a Wednesday
        let now = datetime!(2025-08-20 15:30 +8);
        let bounds = bounds(Period::Week, now);

        assert_eq!(bounds.start, datetime!(2025-08-18 00:00 +8));
        assert_eq!(bounds.end, datetime!(2025-08-25 00:00 +8));
        assert_eq!(bounds.scale, 1.0);
    }

    #[test]
    fn week_bounds_use_the_tracking_zone_not_utc() {
        // Sunday 18:00 UTC is already Monday 02:00 in the tracking zone
        let now = datetime!(2025-08-17 18:00 UTC);
        let bounds = bounds(Period::Week, now);

        assert_eq!(bounds.start, datetime!(2025-08-18 00:00 +8));
    }

    #[test]
    fn month_bounds_cover_the_calendar_month() {
        let now = datetime!(2025-02-10 09:00 +8);
        let bounds = bounds(Period::Month, now);

        assert_eq!(bounds.start, datetime!(2025-02-01 00:00 +8));
        assert_eq!(bounds.end, datetime!(2025-03-01 00:00 +8));
        assert_eq!(bounds.scale, 28.0 / 7.0);
    }

    #[test]
    fn december_rolls_over_to_january() {
        let now = datetime!(2025-12-15 12:00 +8);
        let bounds = bounds(Period::Month, now);

        assert_eq!(bounds.start, datetime!(2025-12-01 00:00 +8));
        assert_eq!(bounds.end, datetime!(2026-01-01 00:00 +8));
        assert_eq!(bounds.scale, 31.0 / 7.0);
    }

    #[test]
    fn year_bounds_span_the_calendar_year() {
        let now = datetime!(2024-06-01 00:00 +8);
        let bounds = bounds(Period::Year, now);

        assert_eq!(bounds.start, datetime!(2024-01-01 00:00 +8));
        assert_eq!(bounds.end, datetime!(2025-01-01 00:00 +8));
        // 2024 is a leap year
        assert_eq!(bounds.scale, 366.0 / 7.0);
    }

    #[test]
    fn custom_range_is_inclusive_of_both_ends() {
        let bounds = custom_bounds("2025-03-03", "2025-03-09").unwrap();

        assert_eq!(bounds.start, datetime!(2025-03-03 00:00 +8));
        assert_eq!(bounds.end, datetime!(2025-03-10 00:00 +8));
        assert_eq!(bounds.scale, 1.0);
    }

    #[test]
    fn single_day_range_scales_to_one_seventh() {
        let bounds = custom_bounds("2025-03-03", "2025-03-03").unwrap();

        assert_eq!(bounds.start, datetime!(2025-03-03 00:00 +8));
        assert_eq!(bounds.end, datetime!(2025-03-04 00:00 +8));
        assert_eq!(bounds.scale, 1.0 / 7.0);
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = custom_bounds("2025-03-09", "2025-03-03").unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn unparsable_dates_are_rejected() {
        assert!(matches!(
            custom_bounds("03/03/2025", "2025-03-09"),
            Err(DomainError::InvalidDateFormat(_))
        ));
        assert!(matches!(
            custom_bounds("2025-03-03", "not-a-date"),
            Err(DomainError::InvalidDateFormat(_))
        ));
    }

    #[test]
    fn unknown_period_names_are_rejected() {
        assert!(matches!(
            Period::parse("fortnight"),
            Err(DomainError::InvalidPeriod(_))
        ));
        assert_eq!(Period::parse("WEEK").unwrap(), Period::Week);
        assert_eq!(Period::parse("month").unwrap(), Period::Month);
    }

    #[test]
    fn week_start_of_lands_on_monday() {
        assert_eq!(week_start_of(datetime!(2025-08-24 23:59 +8)), date!(2025-08-18));
        assert_eq!(week_start_of(datetime!(2025-08-18 00:00 +8)), date!(2025-08-18));
        assert_eq!(format_date(date!(2025-08-18)), "2025-08-18");
    }
}
