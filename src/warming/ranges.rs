//! Canonical date ranges the warmer keeps hot.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// A named inclusive range relative to a reference date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarmRange {
    pub name: &'static str,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WarmRange {
    fn new(name: &'static str, start: NaiveDate, end: NaiveDate) -> Self {
        Self { name, start, end }
    }
}

/// Today, trailing 7/30/90 days, current and previous quarter, month-to-date
/// and year-to-date, in that order
///
/// Trailing windows include the reference date. Quarters cover their full
/// calendar span.
pub fn canonical_ranges(reference: NaiveDate) -> Vec<WarmRange> {
    let trailing = |days: i64| reference - Duration::days(days - 1);
    let (quarter_start, quarter_end) = quarter_bounds(reference);
    let (previous_start, previous_end) = quarter_bounds(quarter_start - Duration::days(1));

    vec![
        WarmRange::new("today", reference, reference),
        WarmRange::new("last_7_days", trailing(7), reference),
        WarmRange::new("last_30_days", trailing(30), reference),
        WarmRange::new("last_90_days", trailing(90), reference),
        WarmRange::new("current_quarter", quarter_start, quarter_end),
        WarmRange::new("previous_quarter", previous_start, previous_end),
        WarmRange::new("month_to_date", first_of_month(reference.year(), reference.month()), reference),
        WarmRange::new("year_to_date", first_of_month(reference.year(), 1), reference),
    ]
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// First and last day of the calendar quarter containing `date`
fn quarter_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first_month = (date.month0() / 3) * 3 + 1;
    let start = first_of_month(date.year(), first_month);
    let next_start = if first_month == 10 {
        first_of_month(date.year() + 1, 1)
    } else {
        first_of_month(date.year(), first_month + 3)
    };
    (start, next_start - Duration::days(1))
}
