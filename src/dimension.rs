//! Calendar dimension generation
//!
//! One row per date over an inclusive range, with the derived calendar
//! fields of `dim_time`. Generation is deterministic; loading lives in
//! [`crate::load::populate_dim_time`].

use chrono::{Datelike, NaiveDate, Weekday};
use thiserror::Error;

use crate::frame::Row;

/// Default first date of the dimension
pub const DEFAULT_START: (i32, u32, u32) = (2021, 1, 1);

/// Default last date of the dimension
pub const DEFAULT_END: (i32, u32, u32) = (2025, 12, 31);

/// Errors that can occur while generating the dimension
#[derive(Error, Debug, PartialEq)]
pub enum DimensionError {
    /// End date before start date
    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Result type for dimension generation
pub type DimensionResult<T> = Result<T, DimensionError>;

/// Default dimension range
pub fn default_range() -> (NaiveDate, NaiveDate) {
    let date = |(y, m, d): (i32, u32, u32)| {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
    };
    (date(DEFAULT_START), date(DEFAULT_END))
}

/// Derived calendar fields of one date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    /// 1 (Monday) to 7 (Sunday)
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub day_of_year: u32,
    /// ISO-8601 week number
    pub week_of_year: u32,
    pub month: u32,
    pub month_name: String,
    pub quarter: u32,
    pub year: i32,
    pub is_weekend: bool,
    pub is_holiday: bool,
}

impl CalendarDay {
    /// Derive the calendar fields of a date
    pub fn new(date: NaiveDate) -> Self {
        let weekday = date.weekday();
        Self {
            date,
            day_of_week: weekday.number_from_monday(),
            day_of_month: date.day(),
            day_of_year: date.ordinal(),
            week_of_year: date.iso_week().week(),
            month: date.month(),
            month_name: date.format("%B").to_string(),
            quarter: (date.month() - 1) / 3 + 1,
            year: date.year(),
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            is_holiday: false,
        }
    }

    /// Stringified row in `dim_time` column order
    pub fn to_row(&self) -> Row {
        [
            self.date.format("%Y-%m-%d").to_string(),
            self.day_of_week.to_string(),
            self.day_of_month.to_string(),
            self.day_of_year.to_string(),
            self.week_of_year.to_string(),
            self.month.to_string(),
            self.month_name.clone(),
            self.quarter.to_string(),
            self.year.to_string(),
            self.is_weekend.to_string(),
            self.is_holiday.to_string(),
        ]
        .into_iter()
        .map(Some)
        .collect()
    }
}

/// Generate one calendar day per date in `[start, end]`
pub fn calendar(start: NaiveDate, end: NaiveDate) -> DimensionResult<Vec<CalendarDay>> {
    if end < start {
        return Err(DimensionError::InvalidRange { start, end });
    }
    Ok(start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(CalendarDay::new)
        .collect())
}

/// Generate `dim_time` rows for `[start, end]`
pub fn dim_time_rows(start: NaiveDate, end: NaiveDate) -> DimensionResult<Vec<Row>> {
    Ok(calendar(start, end)?.iter().map(CalendarDay::to_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DIM_TIME_COLUMNS;
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_row_count_and_unique_dates() {
        let days = calendar(date(2024, 1, 1), date(2024, 12, 31)).unwrap();
        assert_eq!(days.len(), 366);
        let unique: HashSet<_> = days.iter().map(|d| d.date).collect();
        assert_eq!(unique.len(), 366);

        let (start, end) = default_range();
        let days = calendar(start, end).unwrap();
        assert_eq!(days.len() as i64, (end - start).num_days() + 1);
    }

    #[test]
    fn test_single_day_and_inverted_range() {
        assert_eq!(calendar(date(2023, 5, 5), date(2023, 5, 5)).unwrap().len(), 1);
        assert_eq!(
            calendar(date(2023, 5, 6), date(2023, 5, 5)).unwrap_err(),
            DimensionError::InvalidRange {
                start: date(2023, 5, 6),
                end: date(2023, 5, 5)
            }
        );
    }

    #[test]
    fn test_derived_fields() {
        let day = CalendarDay::new(date(2021, 1, 3));
        assert_eq!(day.day_of_week, 7);
        assert!(day.is_weekend);
        assert_eq!(day.week_of_year, 53);
        assert_eq!(day.day_of_year, 3);
        assert_eq!(day.quarter, 1);
        assert_eq!(day.month_name, "January");
        assert!(!day.is_holiday);

        let leap = CalendarDay::new(date(2024, 2, 29));
        assert_eq!(leap.day_of_year, 60);
        assert_eq!(leap.day_of_week, 4);
        assert!(!leap.is_weekend);

        assert_eq!(CalendarDay::new(date(2022, 10, 1)).quarter, 4);
    }

    #[test]
    fn test_row_matches_columns() {
        let rows = dim_time_rows(date(2021, 1, 1), date(2021, 1, 2)).unwrap();
        assert_eq!(rows[0].len(), DIM_TIME_COLUMNS.len());
        assert_eq!(rows[0][0].as_deref(), Some("2021-01-01"));
        assert_eq!(rows[0][1].as_deref(), Some("5"));
        assert_eq!(rows[1][9].as_deref(), Some("true"));
        assert_eq!(rows[1][10].as_deref(), Some("false"));
    }
}
