//! # Counter Store
//!
//! Durable `(day, creator_id)` counters.
//!
//! All mutation goes through two operations:
//! - `increment` - one atomic upsert, never read-then-write
//! - `clear` - unconditional delete (test/reset only)
//!
//! `range_query` returns what exists (sparse); filling gaps is the velocity
//! engine's job.

pub mod sqlite;

pub use sqlite::{run_schema_migrations, SqliteCounterStore};

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub creator_id: String,
    pub count: u64,
}

impl DailyCount {
    pub fn new(day: NaiveDate, creator_id: impl Into<String>, count: u64) -> Self {
        Self {
            day,
            creator_id: creator_id.into(),
            count,
        }
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Create the row with count 1, or add 1 to it, atomically
    async fn increment(&self, day: NaiveDate, creator_id: &str) -> Result<()>;

    /// Rows with `day` in `[start, end]`, ascending by day then creator
    ///
    /// `creator_id = None` returns every creator.
    async fn range_query(
        &self,
        creator_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCount>>;

    /// Delete every row; returns the number removed
    async fn clear(&self) -> Result<u64>;
}
