//! Publish/subscribe transport
//!
//! The `Transport` trait is the seam a networked broker plugs into. The
//! in-process implementation mirrors broker semantics closely enough for the
//! service and its tests:
//! - subscribers without a queue group receive every message on a subject
//! - within a queue group exactly one live member receives each message
//!   (round-robin)
//! - messages on a subject nobody listens to are dropped
//! - receivers that were dropped are pruned on the next publish

use super::message::Message;
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

pub type SubscriptionId = u64;

/// Receiving end of a subscription
///
/// Dropping this does NOT unsubscribe by itself; the transport prunes the
/// entry lazily. Use `Bus` scoped subscriptions for deterministic release.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subject: String,
    pub receiver: mpsc::Receiver<Message>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-forget delivery to every current subscriber of the subject
    async fn publish(&self, message: Message) -> Result<()>;

    /// Register interest in a subject, optionally as a queue group member
    fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<Subscription>;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Live subscriptions on a subject
    fn subscription_count(&self, subject: &str) -> usize;

    /// Live subscriptions across all subjects
    fn total_subscriptions(&self) -> usize;

    /// Reject all further publishes and subscribes
    fn close(&self);
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    queue_group: Option<String>,
    sender: mpsc::Sender<Message>,
}

#[derive(Debug, Default)]
struct Registry {
    subjects: HashMap<String, Vec<Subscriber>>,
    /// Round-robin cursor per (subject, queue group)
    cursors: HashMap<(String, String), usize>,
    closed: bool,
}

impl Registry {
    /// Pick the receivers of one message on `subject`
    fn targets(&mut self, subject: &str) -> Vec<(SubscriptionId, mpsc::Sender<Message>)> {
        let Some(subscribers) = self.subjects.get(subject) else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        let mut groups: HashMap<&str, Vec<&Subscriber>> = HashMap::new();

        for sub in subscribers.iter().filter(|s| !s.sender.is_closed()) {
            match sub.queue_group.as_deref() {
                None => targets.push((sub.id, sub.sender.clone())),
                Some(group) => groups.entry(group).or_default().push(sub),
            }
        }

        for (group, members) in groups {
            let cursor = self
                .cursors
                .entry((subject.to_string(), group.to_string()))
                .or_insert(0);
            let chosen = members[*cursor % members.len()];
            *cursor = cursor.wrapping_add(1);
            targets.push((chosen.id, chosen.sender.clone()));
        }

        targets
    }

    fn remove(&mut self, id: SubscriptionId) {
        let mut emptied = None;
        for (subject, subscribers) in self.subjects.iter_mut() {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            if subscribers.len() != before {
                if subscribers.is_empty() {
                    emptied = Some(subject.clone());
                }
                break;
            }
        }
        if let Some(subject) = emptied {
            self.subjects.remove(&subject);
            self.cursors.retain(|(s, _), _| *s != subject);
        }
    }
}

/// In-process broker backed by tokio mpsc channels
#[derive(Debug)]
pub struct InMemoryTransport {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    channel_buffer: usize,
}

impl InMemoryTransport {
    pub fn new(channel_buffer: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
            channel_buffer: channel_buffer.max(1),
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|_| ServiceError::Transport("subscription registry poisoned".to_string()))
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(1_024)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, message: Message) -> Result<()> {
        let targets = {
            let mut registry = self.registry()?;
            if registry.closed {
                return Err(ServiceError::Transport("transport is closed".to_string()));
            }
            registry.targets(&message.subject)
        };

        if targets.is_empty() {
            log::trace!("no subscribers on {}, message dropped", message.subject);
            return Ok(());
        }

        let mut gone = Vec::new();
        for (id, sender) in targets {
            if sender.send(message.clone()).await.is_err() {
                gone.push(id);
            }
        }

        if !gone.is_empty() {
            let mut registry = self.registry()?;
            for id in gone {
                registry.remove(id);
            }
        }

        Ok(())
    }

    fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<Subscription> {
        if subject.trim().is_empty() {
            return Err(ServiceError::Transport("empty subject".to_string()));
        }

        let mut registry = self.registry()?;
        if registry.closed {
            return Err(ServiceError::Transport("transport is closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.channel_buffer);

        registry
            .subjects
            .entry(subject.to_string())
            .or_default()
            .push(Subscriber {
                id,
                queue_group: queue_group.map(str::to_string),
                sender,
            });

        Ok(Subscription {
            id,
            subject: subject.to_string(),
            receiver,
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        match self.registry() {
            Ok(mut registry) => registry.remove(id),
            Err(e) => log::warn!("⚠️  Failed to unsubscribe {}: {}", id, e),
        }
    }

    fn subscription_count(&self, subject: &str) -> usize {
        self.registry()
            .map(|registry| {
                registry
                    .subjects
                    .get(subject)
                    .map(|subs| subs.iter().filter(|s| !s.sender.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn total_subscriptions(&self) -> usize {
        self.registry()
            .map(|registry| {
                registry
                    .subjects
                    .values()
                    .flatten()
                    .filter(|s| !s.sender.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }

    fn close(&self) {
        if let Ok(mut registry) = self.registry() {
            registry.closed = true;
            registry.subjects.clear();
            registry.cursors.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fanout_without_queue_group() {
        let transport = InMemoryTransport::new(8);
        let mut a = transport.subscribe("info.entry.updated", None).unwrap();
        let mut b = transport.subscribe("info.entry.updated", None).unwrap();

        transport
            .publish(Message::new("info.entry.updated", b"hi".to_vec()))
            .await
            .unwrap();

        assert_eq!(a.receiver.recv().await.unwrap().data, b"hi");
        assert_eq!(b.receiver.recv().await.unwrap().data, b"hi");
    }

    #[tokio::test]
    async fn test_queue_group_delivers_to_one_member_round_robin() {
        let transport = InMemoryTransport::new(8);
        let mut a = transport.subscribe("work", Some("velocity")).unwrap();
        let mut b = transport.subscribe("work", Some("velocity")).unwrap();

        for i in 0..4u8 {
            transport.publish(Message::new("work", vec![i])).await.unwrap();
        }

        let mut got_a = Vec::new();
        while let Ok(m) = a.receiver.try_recv() {
            got_a.push(m.data[0]);
        }
        let mut got_b = Vec::new();
        while let Ok(m) = b.receiver.try_recv() {
            got_b.push(m.data[0]);
        }

        assert_eq!(got_a.len(), 2);
        assert_eq!(got_b.len(), 2);
        let mut all: Vec<u8> = got_a.into_iter().chain(got_b).collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let transport = InMemoryTransport::new(8);
        transport
            .publish(Message::new("nobody.home", Vec::new()))
            .await
            .unwrap();
        assert_eq!(transport.subscription_count("nobody.home"), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_pruning() {
        let transport = InMemoryTransport::new(8);
        let kept = transport.subscribe("t", None).unwrap();
        let dropped = transport.subscribe("t", None).unwrap();
        assert_eq!(transport.subscription_count("t"), 2);

        drop(dropped.receiver);
        assert_eq!(transport.subscription_count("t"), 1);

        transport.publish(Message::new("t", Vec::new())).await.unwrap();
        transport.unsubscribe(kept.id);
        assert_eq!(transport.subscription_count("t"), 0);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_publish() {
        let transport = InMemoryTransport::new(8);
        transport.close();

        let result = transport.publish(Message::new("t", Vec::new())).await;
        assert!(matches!(result, Err(ServiceError::Transport(_))));
        assert!(transport.subscribe("t", None).is_err());
    }
}
