//! Topic handlers
//!
//! | topic | handler | route |
//! |-------|---------|-------|
//! | `info.entry.updated` | `EntryUpdatedHandler` | fire-and-forget |
//! | `insights.increment.dailyCounter` | `IncrementDailyCounterHandler` | fire-and-forget |
//! | `insights.get.velocity` | `GetVelocityHandler` | with response |
//! | `insights.store.drop` | `DropStoreHandler` | with response, test mode only |
//!
//! Delivery is at-least-once and unordered. Increments commute, so a
//! reordered batch ends in the same counts; a redelivered increment is
//! counted again (no exactly-once guarantee).

use crate::bus::Message;
use crate::dispatch::MessageHandler;
use crate::error::{Result, ServiceError};
use crate::messages::{self, EntryUpdated, GetVelocityRequest, IncrementDailyCounter};
use crate::store::CounterStore;
use crate::translator::{normalize_day, EventTranslator};
use crate::velocity::{day_span, VelocityEngine};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// `info.entry.updated` → publish `insights.increment.dailyCounter`
pub struct EntryUpdatedHandler {
    translator: EventTranslator,
}

impl EntryUpdatedHandler {
    pub fn new(translator: EventTranslator) -> Self {
        Self { translator }
    }
}

#[async_trait]
impl MessageHandler for EntryUpdatedHandler {
    async fn handle(&self, message: &Message) -> Result<Option<Value>> {
        let event: EntryUpdated = messages::decode(&message.data)?;
        self.translator.forward(&event).await?;
        Ok(None)
    }
}

/// `insights.increment.dailyCounter` → counter store upsert
pub struct IncrementDailyCounterHandler {
    store: Arc<dyn CounterStore>,
}

impl IncrementDailyCounterHandler {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for IncrementDailyCounterHandler {
    async fn handle(&self, message: &Message) -> Result<Option<Value>> {
        let command: IncrementDailyCounter = messages::decode(&message.data)?;

        if command.creator_id.trim().is_empty() {
            return Err(ServiceError::Decode("empty creator_id".to_string()));
        }

        let day = normalize_day(command.day);
        self.store.increment(day, &command.creator_id).await?;

        log::debug!("➕ {} {}", day, command.creator_id);
        Ok(None)
    }
}

/// `insights.get.velocity` → range read → densify + score
pub struct GetVelocityHandler {
    store: Arc<dyn CounterStore>,
    engine: VelocityEngine,
    max_range_days: u32,
}

impl GetVelocityHandler {
    pub fn new(store: Arc<dyn CounterStore>, engine: VelocityEngine, max_range_days: u32) -> Self {
        Self {
            store,
            engine,
            max_range_days,
        }
    }
}

#[async_trait]
impl MessageHandler for GetVelocityHandler {
    async fn handle(&self, message: &Message) -> Result<Option<Value>> {
        let request: GetVelocityRequest = messages::decode(&message.data)?;

        let start = normalize_day(request.start);
        let end = normalize_day(request.end);

        if end < start {
            return Err(ServiceError::InvalidRequest(format!(
                "end {} is before start {}",
                end, start
            )));
        }

        let span = day_span(start, end);
        if span > i64::from(self.max_range_days) {
            return Err(ServiceError::InvalidRequest(format!(
                "range of {} days exceeds the maximum of {}",
                span, self.max_range_days
            )));
        }

        let creator_id = request
            .creator_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let rows = self
            .store
            .range_query(creator_id, self.engine.fetch_start(start), end)
            .await?;

        let scores = match creator_id {
            Some(id) => self.engine.score_creator(id, &rows, start, end),
            None => self.engine.score_all(&rows, start, end),
        };

        log::debug!(
            "📈 velocity {}..{} ({}): {} rows → {} scores",
            start,
            end,
            creator_id.unwrap_or("all creators"),
            rows.len(),
            scores.len()
        );

        let payload = serde_json::to_value(&scores)
            .map_err(|e| ServiceError::Encode(e.to_string()))?;
        Ok(Some(payload))
    }
}

/// `insights.store.drop` → clear everything
pub struct DropStoreHandler {
    store: Arc<dyn CounterStore>,
}

impl DropStoreHandler {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for DropStoreHandler {
    async fn handle(&self, _message: &Message) -> Result<Option<Value>> {
        self.store.clear().await?;
        Ok(None)
    }
}
