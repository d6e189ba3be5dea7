//! Event translation: `info.entry.updated` → `insights.increment.dailyCounter`
//!
//! The translator never touches the counter store. It normalizes the event
//! time to its UTC day and republishes, so the increment itself can be picked
//! up by any member of the queue group.

use crate::bus::Bus;
use crate::error::Result;
use crate::messages::{self, topics, EntryUpdated, IncrementDailyCounter};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// UTC calendar day of an instant
pub fn normalize_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// Midnight UTC at the start of `day`
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

/// Drop the time-of-day component; idempotent
pub fn truncate_to_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    day_start(normalize_day(instant))
}

/// Pure mapping from event to increment command
pub fn translate(event: &EntryUpdated) -> IncrementDailyCounter {
    IncrementDailyCounter {
        day: truncate_to_day(event.updated_at),
        creator_id: event.creator_id.clone(),
    }
}

#[derive(Clone)]
pub struct EventTranslator {
    bus: Bus,
}

impl EventTranslator {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }

    /// Translate and publish the increment command
    pub async fn forward(&self, event: &EntryUpdated) -> Result<IncrementDailyCounter> {
        let command = translate(event);
        let payload = messages::encode(&command)?;

        self.bus
            .publish(topics::INCREMENT_DAILY_COUNTER, payload)
            .await?;

        log::debug!(
            "📝 entry by {} at {} → increment {}",
            event.creator_id,
            event.updated_at,
            command.day.date_naive()
        );

        Ok(command)
    }
}
