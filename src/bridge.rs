//! JSONL bridge between a byte stream and the bus
//!
//! Each input line is one message:
//!
//! ```text
//! {"subject":"info.entry.updated","payload":{"creator_id":"c1","updated_at":"2024-01-10T08:00:00Z"}}
//! {"subject":"insights.get.velocity","payload":{"start":"...","end":"..."},"request":true}
//! ```
//!
//! Requests write exactly one output line, either `{"subject":..,"reply":..}`
//! or `{"subject":..,"error":".."}`. Plain publishes write nothing. Lines that
//! do not parse are logged and skipped.

use crate::bus::Bus;
use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeLine {
    pub subject: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub request: bool,
}

impl BridgeLine {
    pub fn from_jsonl(line: &str) -> Result<Self> {
        let parsed: BridgeLine = serde_json::from_str(line)?;
        if parsed.subject.trim().is_empty() {
            return Err(ServiceError::Decode("empty subject".to_string()));
        }
        Ok(parsed)
    }

    /// Payload bytes as published; `null` becomes an empty body
    fn body(&self) -> Result<Vec<u8>> {
        if self.payload.is_null() {
            return Ok(Vec::new());
        }
        serde_json::to_vec(&self.payload).map_err(|e| ServiceError::Encode(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct BridgeOutput<'a> {
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub published: u64,
    pub requests: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Pump lines from `reader` onto the bus until EOF
pub async fn run_bridge<R, W>(bus: &Bus, reader: R, mut writer: W) -> Result<BridgeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = BridgeStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = match BridgeLine::from_jsonl(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("⚠️  Skipping bridge line: {}", e);
                stats.skipped += 1;
                continue;
            }
        };

        let body = parsed.body()?;

        if !parsed.request {
            match bus.publish(&parsed.subject, body).await {
                Ok(()) => stats.published += 1,
                Err(e) => {
                    log::error!("❌ Publish to {} failed: {}", parsed.subject, e);
                    stats.failed += 1;
                }
            }
            continue;
        }

        stats.requests += 1;
        let output = match bus.request_default(&parsed.subject, body).await {
            Ok(raw) => BridgeOutput {
                subject: &parsed.subject,
                reply: Some(
                    serde_json::from_slice(&raw)
                        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&raw).into_owned())),
                ),
                error: None,
            },
            Err(e) => {
                stats.failed += 1;
                BridgeOutput {
                    subject: &parsed.subject,
                    reply: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let mut encoded =
            serde_json::to_vec(&output).map_err(|e| ServiceError::Encode(e.to_string()))?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }

    log::info!(
        "📊 Bridge closed: {} published, {} requests, {} failed, {} skipped",
        stats.published,
        stats.requests,
        stats.failed,
        stats.skipped
    );

    Ok(stats)
}
