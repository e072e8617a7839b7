//! Proptest strategies for filters and date ranges.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

pub fn code_strategy() -> impl Strategy<Value = String> {
    "[A-Z0-9]{1,6}"
}

pub fn code_list_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(code_strategy(), 0..6)
}

/// A start date within 2020..2030 and an end up to `max_span` days later
pub fn date_range_strategy(max_span: i64) -> impl Strategy<Value = (NaiveDate, NaiveDate)> {
    (0i64..3_650, 0i64..=max_span).prop_map(|(offset, span)| {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(offset);
        (start, start + Duration::days(span))
    })
}
