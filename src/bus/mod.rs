//! # Message Bus
//!
//! Publish/subscribe plumbing plus the request/response emulation built on
//! top of it.
//!
//! ## Architecture
//!
//! ```text
//! Bus::request(topic)
//!     │ subscribe _INBOX.<uuid>   (ScopedSubscription, released on drop)
//!     │ publish {topic, reply: _INBOX.<uuid>}
//!     ▼
//! Transport ──queue group──→ handler subscription ──→ Dispatcher
//!     ▲                                                   │
//!     └────────────── publish {_INBOX.<uuid>} ◄───────────┘
//! ```
//!
//! The transport only knows fire-and-forget delivery. Everything that looks
//! synchronous (a reply, a timeout) lives in [`adapter`].
//!
//! ## Module Organization
//!
//! - `message` - the unit carried by the transport
//! - `transport` - `Transport` trait and the in-process implementation
//! - `adapter` - `Bus`: publish, request with deadline, scoped subscriptions

pub mod adapter;
pub mod message;
pub mod transport;

pub use adapter::{Bus, ReplyCorrelation, ScopedSubscription};
pub use message::Message;
pub use transport::{InMemoryTransport, Subscription, SubscriptionId, Transport};
