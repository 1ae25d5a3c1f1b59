use crate::model::SnapshotId;
use chrono::{Datelike, Months, NaiveDate};

/// First day of the month on or after `date`.
pub fn month_ceil(date: NaiveDate) -> Option<NaiveDate> {
    let first = date.with_day(1)?;
    if first == date {
        Some(first)
    } else {
        first.checked_add_months(Months::new(1))
    }
}

/// Every first-of-month date in `[start, end]`, oldest first.
pub fn month_starts(start: NaiveDate, end: NaiveDate) -> Vec<SnapshotId> {
    let mut out = Vec::new();
    let mut current = match month_ceil(start) {
        Some(d) => d,
        None => return out,
    };
    while current <= end {
        out.push(SnapshotId::new(current));
        current = match current.checked_add_months(Months::new(1)) {
            Some(d) => d,
            None => break,
        };
    }
    out
}
