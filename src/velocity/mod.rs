//! # Velocity Engine
//!
//! Turns sparse counter rows into a dense, scored daily series.
//!
//! ```text
//! range_query(creator, start - lookback, end)   (sparse rows)
//!     ↓
//! densify                                       (one row per day, zeros filled)
//!     ↓
//! ScoringPolicy::score                          (one score per day)
//!     ↓
//! drop the lookback prefix                      (exactly [start, end])
//! ```
//!
//! The lookback prefix exists so windowed policies have a real baseline on
//! the first requested day instead of an implied run of zeros.

pub mod densify;
pub mod scorer;

pub use densify::{day_span, densify};
pub use scorer::{policy_from_config, Ewma, RawCount, ScoringPolicy, TrailingMeanDelta};

use crate::store::DailyCount;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Derived per-day score; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityScore {
    pub day: NaiveDate,
    pub creator_id: String,
    pub score: f64,
}

#[derive(Clone)]
pub struct VelocityEngine {
    policy: Arc<dyn ScoringPolicy>,
}

impl VelocityEngine {
    pub fn new(policy: Arc<dyn ScoringPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// First day that has to be read from the store to score `start`
    pub fn fetch_start(&self, start: NaiveDate) -> NaiveDate {
        start
            .checked_sub_days(Days::new(u64::from(self.policy.lookback_days())))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Dense scored series for one creator over `[start, end]`
    ///
    /// `sparse` may contain rows of other creators and rows before `start`
    /// (the lookback); both are handled here.
    pub fn score_creator(
        &self,
        creator_id: &str,
        sparse: &[DailyCount],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<VelocityScore> {
        if end < start {
            return Vec::new();
        }

        let fetch_start = self.fetch_start(start);
        let dense = densify(creator_id, sparse, fetch_start, end);
        let counts: Vec<u64> = dense.iter().map(|row| row.count).collect();
        let scores = self.policy.score(&counts);

        dense
            .into_iter()
            .zip(scores)
            .filter(|(row, _)| row.day >= start)
            .map(|(row, score)| VelocityScore {
                day: row.day,
                creator_id: row.creator_id,
                score,
            })
            .collect()
    }

    /// Dense scored series for every creator present in `sparse`
    ///
    /// Ordered by creator id, then day.
    pub fn score_all(
        &self,
        sparse: &[DailyCount],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<VelocityScore> {
        let mut by_creator: BTreeMap<&str, Vec<DailyCount>> = BTreeMap::new();
        for row in sparse {
            by_creator
                .entry(row.creator_id.as_str())
                .or_default()
                .push(row.clone());
        }

        by_creator
            .into_iter()
            .flat_map(|(creator_id, rows)| self.score_creator(creator_id, &rows, start, end))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_raw_count_series_covers_requested_range() {
        let engine = VelocityEngine::new(Arc::new(RawCount));
        let sparse = vec![DailyCount::new(day(2024, 1, 10), "c1", 3)];

        let series = engine.score_creator("c1", &sparse, day(2024, 1, 1), day(2024, 1, 31));

        assert_eq!(series.len(), 31);
        assert_eq!(series[0].day, day(2024, 1, 1));
        assert_eq!(series[30].day, day(2024, 1, 31));
        for point in &series {
            let expected = if point.day == day(2024, 1, 10) { 3.0 } else { 0.0 };
            assert_eq!(point.score, expected, "day {}", point.day);
            assert_eq!(point.creator_id, "c1");
        }
    }

    #[test]
    fn test_lookback_rows_feed_the_baseline_but_are_not_returned() {
        let engine = VelocityEngine::new(Arc::new(TrailingMeanDelta::new(2)));
        assert_eq!(engine.fetch_start(day(2024, 1, 3)), day(2024, 1, 1));

        let sparse = vec![
            DailyCount::new(day(2024, 1, 1), "c1", 4),
            DailyCount::new(day(2024, 1, 2), "c1", 2),
            DailyCount::new(day(2024, 1, 3), "c1", 6),
        ];

        let series = engine.score_creator("c1", &sparse, day(2024, 1, 3), day(2024, 1, 4));

        assert_eq!(series.len(), 2);
        // 6 - mean(4, 2)
        assert_eq!(series[0].score, 3.0);
        // 0 - mean(2, 6)
        assert_eq!(series[1].score, -4.0);
    }

    #[test]
    fn test_score_all_groups_by_creator() {
        let engine = VelocityEngine::new(Arc::new(RawCount));
        let sparse = vec![
            DailyCount::new(day(2024, 1, 1), "zed", 1),
            DailyCount::new(day(2024, 1, 2), "amy", 2),
        ];

        let series = engine.score_all(&sparse, day(2024, 1, 1), day(2024, 1, 2));

        let keys: Vec<_> = series
            .iter()
            .map(|s| (s.creator_id.as_str(), s.day, s.score))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("amy", day(2024, 1, 1), 0.0),
                ("amy", day(2024, 1, 2), 2.0),
                ("zed", day(2024, 1, 1), 1.0),
                ("zed", day(2024, 1, 2), 0.0),
            ]
        );
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let engine = VelocityEngine::new(Arc::new(Ewma::new(0.3, 5)));
        let sparse = vec![
            DailyCount::new(day(2024, 5, 2), "c1", 7),
            DailyCount::new(day(2024, 5, 9), "c1", 1),
        ];

        let first = engine.score_creator("c1", &sparse, day(2024, 5, 1), day(2024, 5, 20));
        let second = engine.score_creator("c1", &sparse, day(2024, 5, 1), day(2024, 5, 20));
        assert_eq!(first, second);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let engine = VelocityEngine::new(Arc::new(RawCount));
        assert!(engine
            .score_creator("c1", &[], day(2024, 1, 2), day(2024, 1, 1))
            .is_empty());
    }

    #[test]
    fn test_fetch_start_saturates_at_min_date() {
        let engine = VelocityEngine::new(Arc::new(TrailingMeanDelta::new(7)));
        assert_eq!(engine.fetch_start(NaiveDate::MIN), NaiveDate::MIN);
    }
}
