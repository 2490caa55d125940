//! Data access layer
//!
//! Per-feature `impl Database` blocks pairing queries (reads) with mutations
//! (writes). Authorization happens one level up, in `crate::actions`.

mod booking;
mod loyalty;
mod staff;

pub use booking::NewAppointment;

use chrono::{NaiveDate, NaiveDateTime};

use crate::utils::at_minutes;

/// `[00:00 on date, 00:00 on the following day)`
pub(crate) fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = at_minutes(date, 0);
    let end = date.succ_opt().map_or(start, |next| at_minutes(next, 0));
    (start, end)
}

/// `[00:00 on start, 00:00 after end)`
pub(crate) fn range_bounds(start: NaiveDate, end: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (day_bounds(start).0, day_bounds(end).1)
}

/// `?, ?, ?` with `count` placeholders.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Prefix every column in a comma separated list with a table alias.
pub(crate) fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
