//! Wire payloads and the reply envelope
//!
//! Payloads are JSON. Instants are RFC 3339 UTC timestamps; days inside
//! velocity results are `YYYY-MM-DD`.
//!
//! Reply envelope published by the dispatcher on request/response topics:
//!
//! ```text
//! {"status":"ok","payload":<json>}
//! {"status":"error","error":{"kind":"decode","message":"..."}}
//! ```

use crate::error::{ErrorKind, Result, ServiceError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic names
pub mod topics {
    /// Entry created/updated upstream
    pub const ENTRY_UPDATED: &str = "info.entry.updated";

    /// Increment one `(day, creator)` counter
    pub const INCREMENT_DAILY_COUNTER: &str = "insights.increment.dailyCounter";

    /// Velocity range query (request/response)
    pub const GET_VELOCITY: &str = "insights.get.velocity";

    /// Clear the counter store (test mode only)
    pub const STORE_DROP: &str = "insights.store.drop";
}

/// `info.entry.updated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdated {
    pub creator_id: String,
    pub updated_at: DateTime<Utc>,
}

/// `insights.increment.dailyCounter`
///
/// `day` is an instant; consumers truncate it to its UTC day again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementDailyCounter {
    pub day: DateTime<Utc>,
    pub creator_id: String,
}

/// `insights.get.velocity` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetVelocityRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Restrict to one creator; all creators in range when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok {
        #[serde(default)]
        payload: Value,
    },
    Error {
        error: ErrorBody,
    },
}

impl Reply {
    pub fn ok(payload: Value) -> Self {
        Reply::Ok { payload }
    }

    pub fn from_error(err: &ServiceError) -> Self {
        Reply::Error {
            error: ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        decode(data)
    }

    /// Success payload, or the remote failure as `ServiceError::Remote`
    pub fn into_result(self) -> Result<Value> {
        match self {
            Reply::Ok { payload } => Ok(payload),
            Reply::Error { error } => Err(ServiceError::Remote {
                kind: error.kind,
                message: error.message,
            }),
        }
    }
}

/// Decode a JSON payload, tagging failures as `Decode`
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| ServiceError::Decode(e.to_string()))
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ServiceError::Encode(e.to_string()))
}
