//! # Velocity
//!
//! Per-creator daily activity counters and velocity scores, served over a
//! publish/subscribe bus.
//!
//! ## Architecture
//!
//! ```text
//! info.entry.updated ──→ EventTranslator ──publish──→ insights.increment.dailyCounter
//!                                                             │
//!                                                             ▼
//!                                                  CounterStore::increment (upsert)
//!
//! insights.get.velocity (request) ──→ CounterStore::range_query
//!                                          ↓
//!                                     VelocityEngine (densify + score)
//!                                          ↓
//!                                     Dispatcher ──reply──→ _INBOX.<uuid>
//! ```
//!
//! ## Module Organization
//!
//! - `bus` - transport, scoped subscriptions, request/response
//! - `dispatch` - topic → handler table, reply policy
//! - `handlers` - one handler per topic
//! - `translator` - day normalization, entry event → increment command
//! - `store` - counter store trait + SQLite implementation
//! - `velocity` - densify and scoring policies
//! - `service` - dependency struct wiring it all together
//! - `client` - typed request helpers
//! - `bridge` - JSONL stdin/stdout bridge used by the binary
//! - `messages` - wire payloads and reply envelope
//! - `config`, `error`

pub mod bridge;
pub mod bus;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod service;
pub mod store;
pub mod translator;
pub mod velocity;

pub use bus::{Bus, InMemoryTransport, Message, Transport};
pub use client::VelocityClient;
pub use config::ServiceConfig;
pub use dispatch::{Dispatcher, HandlerRegistry, MessageHandler, ReplyPolicy, Route};
pub use error::{ErrorKind, Result, ServiceError};
pub use service::Service;
pub use store::{CounterStore, DailyCount, SqliteCounterStore};
pub use velocity::{VelocityEngine, VelocityScore};
