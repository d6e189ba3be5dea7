//! Velocity scoring policies
//!
//! A policy maps a dense, ascending series of daily counts to one score per
//! day. Policies are pure: same counts in, same scores out.
//!
//! | name | score(d) | lookback |
//! |------|----------|----------|
//! | `trailing_mean_delta` | `count(d) - mean(count(d-N) .. count(d-1))` | N |
//! | `raw_count` | `count(d)` | 0 |
//! | `ewma` | `alpha * count(d) + (1 - alpha) * score(d-1)`, seeded with 0 | N |
//!
//! The service default is `trailing_mean_delta` with N = 7.

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use std::fmt::Debug;
use std::sync::Arc;

pub trait ScoringPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Days before the requested start the series must include
    fn lookback_days(&self) -> u32;

    /// One score per input count, same order
    fn score(&self, counts: &[u64]) -> Vec<f64>;
}

/// Score is the count itself
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCount;

impl ScoringPolicy for RawCount {
    fn name(&self) -> &'static str {
        "raw_count"
    }

    fn lookback_days(&self) -> u32 {
        0
    }

    fn score(&self, counts: &[u64]) -> Vec<f64> {
        counts.iter().map(|c| *c as f64).collect()
    }
}

/// Count minus the mean of the preceding `window` days
///
/// Near the front of the series the baseline averages whatever preceding
/// days exist; the first entry has baseline 0.
#[derive(Debug, Clone, Copy)]
pub struct TrailingMeanDelta {
    window: u32,
}

impl TrailingMeanDelta {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl ScoringPolicy for TrailingMeanDelta {
    fn name(&self) -> &'static str {
        "trailing_mean_delta"
    }

    fn lookback_days(&self) -> u32 {
        self.window
    }

    fn score(&self, counts: &[u64]) -> Vec<f64> {
        let window = self.window as usize;

        counts
            .iter()
            .enumerate()
            .map(|(i, count)| {
                let preceding = &counts[i.saturating_sub(window)..i];
                let baseline = if preceding.is_empty() {
                    0.0
                } else {
                    preceding.iter().sum::<u64>() as f64 / preceding.len() as f64
                };
                *count as f64 - baseline
            })
            .collect()
    }
}

/// Exponentially weighted moving average of daily counts
#[derive(Debug, Clone, Copy)]
pub struct Ewma {
    alpha: f64,
    lookback: u32,
}

impl Ewma {
    pub fn new(alpha: f64, lookback: u32) -> Self {
        Self { alpha, lookback }
    }
}

impl ScoringPolicy for Ewma {
    fn name(&self) -> &'static str {
        "ewma"
    }

    fn lookback_days(&self) -> u32 {
        self.lookback
    }

    fn score(&self, counts: &[u64]) -> Vec<f64> {
        let mut state = 0.0;
        counts
            .iter()
            .map(|count| {
                state = self.alpha * *count as f64 + (1.0 - self.alpha) * state;
                state
            })
            .collect()
    }
}

/// Build the configured policy
///
/// Unknown names and out-of-range parameters are configuration errors.
pub fn policy_from_config(config: &ServiceConfig) -> Result<Arc<dyn ScoringPolicy>> {
    match config.scoring.as_str() {
        "trailing_mean_delta" => {
            if config.window_days == 0 {
                return Err(ServiceError::Config(
                    "VELOCITY_WINDOW_DAYS must be at least 1".to_string(),
                ));
            }
            Ok(Arc::new(TrailingMeanDelta::new(config.window_days)))
        }
        "raw_count" => Ok(Arc::new(RawCount)),
        "ewma" => {
            if !(config.ewma_alpha > 0.0 && config.ewma_alpha <= 1.0) {
                return Err(ServiceError::Config(format!(
                    "VELOCITY_EWMA_ALPHA must be in (0, 1], got {}",
                    config.ewma_alpha
                )));
            }
            Ok(Arc::new(Ewma::new(config.ewma_alpha, config.window_days)))
        }
        other => Err(ServiceError::Config(format!(
            "unknown scoring policy: {}",
            other
        ))),
    }
}
