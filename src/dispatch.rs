//! Handler registry and dispatcher
//!
//! Every topic is bound to exactly one [`Route`]. Handlers share one shape,
//! `handle(&Message) -> Result<Option<Value>>`, and never see reply subjects:
//! the dispatcher applies the route's [`ReplyPolicy`] after the handler
//! returns.
//!
//! | policy | handler Ok | handler Err |
//! |--------|-----------|-------------|
//! | `FireAndForget` | nothing | logged |
//! | `WithResponse` | `{"status":"ok"}` to reply address, if any | logged + `{"status":"error"}` to reply address, if any |
//!
//! Each inbound message runs in its own tokio task; there is no ordering
//! between messages, even on the same topic. Every listener tracks the
//! tasks it spawned, so `Dispatcher::drain` can wait for them.

use crate::bus::{Bus, Message, ScopedSubscription};
use crate::error::{Result, ServiceError};
use crate::messages::Reply;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle, JoinSet};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message. `Some(value)` is the reply payload on
    /// request/response routes; it is ignored on fire-and-forget routes.
    async fn handle(&self, message: &Message) -> Result<Option<Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPolicy {
    FireAndForget,
    WithResponse,
}

#[derive(Clone)]
pub struct Route {
    pub topic: String,
    pub policy: ReplyPolicy,
    pub handler: Arc<dyn MessageHandler>,
}

impl Route {
    pub fn fire_and_forget(topic: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            topic: topic.into(),
            policy: ReplyPolicy::FireAndForget,
            handler,
        }
    }

    pub fn with_response(topic: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            topic: topic.into(),
            policy: ReplyPolicy::WithResponse,
            handler,
        }
    }
}

/// Topic → route table, built before anything subscribes
pub struct HandlerRegistry {
    bus: Bus,
    routes: BTreeMap<String, Route>,
}

impl HandlerRegistry {
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            routes: BTreeMap::new(),
        }
    }

    /// Add a route; a second route on the same topic is rejected
    pub fn register(&mut self, route: Route) -> Result<()> {
        if self.routes.contains_key(&route.topic) {
            return Err(ServiceError::DuplicateHandler(route.topic));
        }
        self.routes.insert(route.topic.clone(), route);
        Ok(())
    }

    pub fn register_handler(
        &mut self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        self.register(Route::fire_and_forget(topic, handler))
    }

    pub fn register_response_handler(
        &mut self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        self.register(Route::with_response(topic, handler))
    }

    pub fn topics(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Subscribe every route in the bus queue group and start listening
    ///
    /// All subscriptions are created before any listener starts, so a
    /// failure leaves nothing subscribed.
    pub fn start(self) -> Result<Dispatcher> {
        let mut subscriptions = Vec::with_capacity(self.routes.len());
        for route in self.routes.values() {
            subscriptions.push((route.clone(), self.bus.subscribe_queue(&route.topic)?));
        }

        let mut listeners = Vec::with_capacity(subscriptions.len());
        let mut topics = Vec::with_capacity(subscriptions.len());

        for (route, subscription) in subscriptions {
            log::info!(
                "   ├─ Listening on {} ({:?}, group: {})",
                route.topic,
                route.policy,
                self.bus.queue_group()
            );
            topics.push(route.topic.clone());

            let (stop, stop_rx) = oneshot::channel();
            listeners.push(Listener {
                topic: route.topic.clone(),
                stop,
                handle: tokio::spawn(listen(self.bus.clone(), route, subscription, stop_rx)),
            });
        }

        log::info!("   └─ Dispatcher started ({} topics)", topics.len());

        Ok(Dispatcher { listeners, topics })
    }
}

/// Feed one subscription into per-message tasks
///
/// On the stop signal the subscription is closed; messages already buffered
/// are still dispatched, and the listener returns only after every task it
/// spawned has finished.
async fn listen(
    bus: Bus,
    route: Route,
    mut subscription: ScopedSubscription,
    mut stop: oneshot::Receiver<()>,
) {
    let mut tasks = JoinSet::new();
    let mut stop_armed = true;

    loop {
        tokio::select! {
            message = subscription.next() => {
                let Some(message) = message else { break };
                let bus = bus.clone();
                let route = route.clone();
                tasks.spawn(async move {
                    dispatch_message(&bus, &route, message).await;
                });
            }
            signal = &mut stop, if stop_armed => {
                stop_armed = false;
                // Err: the Dispatcher was dropped, keep listening
                if signal.is_ok() {
                    subscription.close();
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                report_task(&route.topic, joined);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        report_task(&route.topic, joined);
    }
    log::debug!("subscription on {} drained", subscription.subject());
}

fn report_task(topic: &str, joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            log::error!("❌ Handler task for {} panicked: {}", topic, e);
        }
    }
}

struct Listener {
    topic: String,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Running listeners
///
/// Dropping it leaves them running. `drain` stops them without losing
/// buffered messages, `shutdown` aborts them.
pub struct Dispatcher {
    listeners: Vec<Listener>,
    topics: Vec<String>,
}

impl Dispatcher {
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Stop listening once everything already delivered has been handled
    ///
    /// Topics named in `first` are drained one at a time in that order, the
    /// rest together afterwards. Draining a topic closes its subscription,
    /// dispatches what is still buffered and waits for every handler task.
    /// List a topic before the topics its handlers publish to.
    pub async fn drain(self, first: &[&str]) {
        let mut pending = self.listeners;

        for topic in first {
            if let Some(pos) = pending.iter().position(|l| l.topic == *topic) {
                let listener = pending.remove(pos);
                let _ = listener.stop.send(());
                wait_listener(&listener.topic, listener.handle).await;
            }
        }

        let mut running = Vec::with_capacity(pending.len());
        for listener in pending {
            let _ = listener.stop.send(());
            running.push((listener.topic, listener.handle));
        }
        for (topic, handle) in running {
            wait_listener(&topic, handle).await;
        }

        log::info!("🛑 Dispatcher drained");
    }

    /// Abort every listener and its in-flight handler tasks
    pub async fn shutdown(self) {
        for listener in &self.listeners {
            listener.handle.abort();
        }
        for listener in self.listeners {
            let _ = listener.handle.await;
        }
        log::info!("🛑 Dispatcher stopped");
    }
}

async fn wait_listener(topic: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        log::error!("❌ Listener for {} failed: {}", topic, e);
    }
}

/// Run one message through its route and apply the reply policy
pub async fn dispatch_message(bus: &Bus, route: &Route, message: Message) {
    let outcome = route.handler.handle(&message).await;

    match (route.policy, outcome) {
        (ReplyPolicy::FireAndForget, Ok(_)) => {}
        (ReplyPolicy::FireAndForget, Err(e)) => {
            log::warn!("⚠️  Handler for {} failed: {}", route.topic, e);
        }
        (ReplyPolicy::WithResponse, Ok(payload)) => {
            if let Some(reply_to) = message.reply_to() {
                send_reply(bus, &route.topic, reply_to, Reply::ok(payload.unwrap_or(Value::Null)))
                    .await;
            }
        }
        (ReplyPolicy::WithResponse, Err(e)) => {
            log::error!("❌ Handler for {} failed: {}", route.topic, e);
            if let Some(reply_to) = message.reply_to() {
                send_reply(bus, &route.topic, reply_to, Reply::from_error(&e)).await;
            }
        }
    }
}

async fn send_reply(bus: &Bus, topic: &str, reply_to: &str, reply: Reply) {
    let payload = match reply.encode() {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("❌ Failed to encode reply for {}: {}", topic, e);
            return;
        }
    };

    if let Err(e) = bus.publish_message(Message::new(reply_to, payload)).await {
        log::error!("❌ Failed to publish reply for {}: {}", topic, e);
    }
}
