//! Request/response over publish/subscribe
//!
//! `Bus` is the only type handlers and clients talk to. It wraps a shared
//! `Transport` and adds:
//! - scoped subscriptions that unsubscribe when dropped
//! - `request`: ephemeral inbox + publish + wait for exactly one reply
//!
//! Every exit path of `request` (reply, timeout, publish failure) drops the
//! inbox guard, so no reply subscription outlives its call.

use super::message::Message;
use super::transport::{Subscription, SubscriptionId, Transport};
use crate::error::{Result, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const INBOX_PREFIX: &str = "_INBOX";

/// Bookkeeping for one outstanding request
#[derive(Debug, Clone)]
pub struct ReplyCorrelation {
    pub correlation_id: Uuid,
    pub reply_topic: String,
    pub deadline: Instant,
}

impl ReplyCorrelation {
    pub fn new(timeout: Duration) -> Self {
        let correlation_id = Uuid::new_v4();
        Self {
            correlation_id,
            reply_topic: format!("{}.{}", INBOX_PREFIX, correlation_id.simple()),
            deadline: Instant::now() + timeout,
        }
    }
}

/// Subscription that is released when dropped
pub struct ScopedSubscription {
    transport: Arc<dyn Transport>,
    inner: Subscription,
}

impl ScopedSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    pub fn subject(&self) -> &str {
        &self.inner.subject
    }

    /// Next message, or `None` once the transport drops the subscription
    /// (or, after `close`, once the buffer is empty)
    pub async fn next(&mut self) -> Option<Message> {
        self.inner.receiver.recv().await
    }

    /// Stop accepting new messages; already buffered ones stay readable
    pub fn close(&mut self) {
        log::debug!("closing subscription {} on {}", self.id(), self.subject());
        self.inner.receiver.close();
    }
}

impl Drop for ScopedSubscription {
    fn drop(&mut self) {
        self.transport.unsubscribe(self.inner.id);
    }
}

/// Handle to the message bus
///
/// Cheap to clone; every clone shares the same transport.
#[derive(Clone)]
pub struct Bus {
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
    queue_group: String,
}

impl Bus {
    pub fn new(
        transport: Arc<dyn Transport>,
        default_timeout: Duration,
        queue_group: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            default_timeout,
            queue_group: queue_group.into(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    /// Fire-and-forget publish
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.transport.publish(Message::new(topic, payload)).await
    }

    /// Publish a prebuilt message (keeps its reply address)
    pub async fn publish_message(&self, message: Message) -> Result<()> {
        self.transport.publish(message).await
    }

    /// Subscribe as a member of this service's queue group
    pub fn subscribe_queue(&self, topic: &str) -> Result<ScopedSubscription> {
        self.scoped(topic, Some(self.queue_group.as_str()))
    }

    /// Subscribe to every message on a topic
    pub fn subscribe(&self, topic: &str) -> Result<ScopedSubscription> {
        self.scoped(topic, None)
    }

    fn scoped(&self, topic: &str, queue_group: Option<&str>) -> Result<ScopedSubscription> {
        let inner = self.transport.subscribe(topic, queue_group)?;
        Ok(ScopedSubscription {
            transport: Arc::clone(&self.transport),
            inner,
        })
    }

    /// Publish `payload` on `topic` and wait up to `timeout` for one reply
    ///
    /// Errors:
    /// - `Transport` if subscribing to the inbox or publishing fails
    /// - `Timeout` if no reply arrives before the deadline
    pub async fn request(&self, topic: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let correlation = ReplyCorrelation::new(timeout);
        let mut inbox = self.subscribe(&correlation.reply_topic)?;

        log::debug!(
            "➡️  request {} on {} (reply: {})",
            correlation.correlation_id,
            topic,
            correlation.reply_topic
        );

        let message = Message::new(topic, payload).with_reply(correlation.reply_topic.clone());
        self.transport.publish(message).await?;

        match tokio::time::timeout_at(correlation.deadline, inbox.next()).await {
            Ok(Some(reply)) => Ok(reply.data),
            Ok(None) => Err(ServiceError::Transport(format!(
                "reply inbox {} closed before a response arrived",
                correlation.reply_topic
            ))),
            Err(_) => {
                log::debug!(
                    "⏱️  request {} on {} timed out after {:?}",
                    correlation.correlation_id,
                    topic,
                    timeout
                );
                Err(ServiceError::Timeout {
                    subject: topic.to_string(),
                    timeout,
                })
            }
        }
    }

    /// `request` with the configured default deadline
    pub async fn request_default(&self, topic: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.request(topic, payload, self.default_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryTransport;

    fn test_bus() -> Bus {
        Bus::new(
            Arc::new(InMemoryTransport::new(16)),
            Duration::from_millis(200),
            "velocity",
        )
    }

    #[tokio::test]
    async fn test_request_receives_reply() {
        let bus = test_bus();
        let mut sub = bus.subscribe_queue("echo").unwrap();

        let responder = bus.clone();
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let reply = msg.reply.clone().unwrap();
                let mut data = msg.data.clone();
                data.reverse();
                responder.publish(&reply, data).await.unwrap();
            }
        });

        let reply = bus
            .request("echo", b"abc".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"cba");
    }

    #[tokio::test]
    async fn test_request_times_out_and_releases_inbox() {
        let bus = test_bus();
        let started = Instant::now();

        let err = bus
            .request("nobody.listens", Vec::new(), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(bus.transport().total_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_request_fails_with_transport_error_when_closed() {
        let bus = test_bus();
        bus.transport().close();

        let err = bus.request_default("anything", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_scoped_subscription_unsubscribes_on_drop() {
        let bus = test_bus();
        {
            let _sub = bus.subscribe_queue("scoped").unwrap();
            assert_eq!(bus.transport().subscription_count("scoped"), 1);
        }
        assert_eq!(bus.transport().subscription_count("scoped"), 0);
    }

    #[test]
    fn test_correlations_are_unique() {
        let a = ReplyCorrelation::new(Duration::from_secs(1));
        let b = ReplyCorrelation::new(Duration::from_secs(1));
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_ne!(a.reply_topic, b.reply_topic);
        assert!(a.reply_topic.starts_with("_INBOX."));
    }
}
