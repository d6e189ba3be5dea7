//! Gap filling for sparse daily series

use crate::store::DailyCount;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Number of days in `[start, end]`; 0 when `end < start`
pub fn day_span(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        0
    } else {
        (end - start).num_days() + 1
    }
}

/// One row per day in `[start, end]` for `creator_id`, ascending
///
/// Rows for other creators or outside the range are ignored. Days with no
/// row get `count: 0`.
pub fn densify(
    creator_id: &str,
    sparse: &[DailyCount],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyCount> {
    let observed: HashMap<NaiveDate, u64> = sparse
        .iter()
        .filter(|row| row.creator_id == creator_id && row.day >= start && row.day <= end)
        .map(|row| (row.day, row.count))
        .collect();

    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| DailyCount {
            day,
            creator_id: creator_id.to_string(),
            count: observed.get(&day).copied().unwrap_or(0),
        })
        .collect()
}
