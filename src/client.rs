//! Typed client for the velocity topics
//!
//! Wraps `Bus` so callers deal in `VelocityScore`s and `ServiceError`s
//! instead of raw bytes and envelopes.

use crate::bus::Bus;
use crate::error::Result;
use crate::messages::{self, topics, EntryUpdated, GetVelocityRequest, IncrementDailyCounter, Reply};
use crate::velocity::VelocityScore;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Clone)]
pub struct VelocityClient {
    bus: Bus,
    timeout: Duration,
}

impl VelocityClient {
    pub fn new(bus: Bus) -> Self {
        let timeout = bus.default_timeout();
        Self { bus, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publish an `info.entry.updated` event
    pub async fn entry_updated(&self, creator_id: &str, updated_at: DateTime<Utc>) -> Result<()> {
        let event = EntryUpdated {
            creator_id: creator_id.to_string(),
            updated_at,
        };
        self.bus
            .publish(topics::ENTRY_UPDATED, messages::encode(&event)?)
            .await
    }

    /// Publish an increment command directly, bypassing translation
    pub async fn increment(&self, day: DateTime<Utc>, creator_id: &str) -> Result<()> {
        let command = IncrementDailyCounter {
            day,
            creator_id: creator_id.to_string(),
        };
        self.bus
            .publish(topics::INCREMENT_DAILY_COUNTER, messages::encode(&command)?)
            .await
    }

    /// Scored series for `[start, end]`
    ///
    /// Error replies surface as `ServiceError::Remote`.
    pub async fn get_velocity(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        creator_id: Option<&str>,
    ) -> Result<Vec<VelocityScore>> {
        let request = GetVelocityRequest {
            start,
            end,
            creator_id: creator_id.map(str::to_string),
        };

        let raw = self
            .bus
            .request(topics::GET_VELOCITY, messages::encode(&request)?, self.timeout)
            .await?;

        let payload = Reply::decode(&raw)?.into_result()?;
        serde_json::from_value(payload).map_err(Into::into)
    }

    /// Clear the counter store; only answered by services in test mode
    pub async fn drop_store(&self) -> Result<()> {
        let raw = self
            .bus
            .request(topics::STORE_DROP, Vec::new(), self.timeout)
            .await?;
        Reply::decode(&raw)?.into_result()?;
        Ok(())
    }
}
