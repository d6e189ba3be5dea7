//! Service context
//!
//! `Service` holds every dependency the handlers need (store, bus, config,
//! scoring engine). It is built once at startup and borrowed by whoever
//! needs it; nothing in the crate keeps global state.

use crate::bus::{Bus, Transport};
use crate::config::ServiceConfig;
use crate::dispatch::{Dispatcher, HandlerRegistry, Route};
use crate::error::Result;
use crate::handlers::{
    DropStoreHandler, EntryUpdatedHandler, GetVelocityHandler, IncrementDailyCounterHandler,
};
use crate::messages::topics;
use crate::store::CounterStore;
use crate::translator::EventTranslator;
use crate::velocity::{policy_from_config, VelocityEngine};
use std::sync::Arc;

pub struct Service {
    config: ServiceConfig,
    store: Arc<dyn CounterStore>,
    bus: Bus,
    engine: VelocityEngine,
}

impl Service {
    /// Wire the dependencies together
    ///
    /// Fails if the configured scoring policy is invalid.
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn CounterStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let engine = VelocityEngine::new(policy_from_config(&config)?);
        let bus = Bus::new(transport, config.request_timeout(), config.queue_group.clone());

        Ok(Self {
            config,
            store,
            bus,
            engine,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn engine(&self) -> &VelocityEngine {
        &self.engine
    }

    /// Every route this service serves
    ///
    /// `insights.store.drop` is only present in test mode.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = Vec::with_capacity(4);

        if self.config.test_mode {
            routes.push(Route::with_response(
                topics::STORE_DROP,
                Arc::new(DropStoreHandler::new(Arc::clone(&self.store))),
            ));
        }

        routes.push(Route::fire_and_forget(
            topics::ENTRY_UPDATED,
            Arc::new(EntryUpdatedHandler::new(EventTranslator::new(self.bus.clone()))),
        ));
        routes.push(Route::fire_and_forget(
            topics::INCREMENT_DAILY_COUNTER,
            Arc::new(IncrementDailyCounterHandler::new(Arc::clone(&self.store))),
        ));
        routes.push(Route::with_response(
            topics::GET_VELOCITY,
            Arc::new(GetVelocityHandler::new(
                Arc::clone(&self.store),
                self.engine.clone(),
                self.config.max_range_days,
            )),
        ));

        routes
    }

    pub fn registry(&self) -> Result<HandlerRegistry> {
        let mut registry = HandlerRegistry::new(self.bus.clone());
        for route in self.routes() {
            registry.register(route)?;
        }
        Ok(registry)
    }

    /// Register all routes and start dispatching
    pub fn start(&self) -> Result<Dispatcher> {
        log::info!("🚀 Starting velocity service");
        log::info!("   ├─ Scoring: {}", self.engine.policy_name());
        log::info!("   ├─ Test mode: {}", self.config.test_mode);
        self.registry()?.start()
    }

    /// Stop after every delivered event has reached the store
    ///
    /// Entry events drain first so the increments they publish are still
    /// consumed by the counter route.
    pub async fn drain(&self, dispatcher: Dispatcher) {
        dispatcher
            .drain(&[topics::ENTRY_UPDATED, topics::INCREMENT_DAILY_COUNTER])
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryTransport;
    use crate::error::ServiceError;
    use crate::store::SqliteCounterStore;

    fn build(config: ServiceConfig) -> Result<Service> {
        Service::new(
            config,
            Arc::new(SqliteCounterStore::open_in_memory().unwrap()),
            Arc::new(InMemoryTransport::default()),
        )
    }

    #[test]
    fn test_drop_route_only_in_test_mode() {
        let production = build(ServiceConfig::default()).unwrap();
        let served: Vec<_> = production.routes().into_iter().map(|r| r.topic).collect();
        assert!(!served.iter().any(|t| t == topics::STORE_DROP));
        assert_eq!(served.len(), 3);

        let config = ServiceConfig {
            test_mode: true,
            ..ServiceConfig::default()
        };
        let test = build(config).unwrap();
        let served: Vec<_> = test.routes().into_iter().map(|r| r.topic).collect();
        assert!(served.iter().any(|t| t == topics::STORE_DROP));
        assert_eq!(served.len(), 4);
    }

    #[test]
    fn test_invalid_scoring_policy_fails_construction() {
        let config = ServiceConfig {
            scoring: "nope".to_string(),
            ..ServiceConfig::default()
        };
        assert!(matches!(build(config), Err(ServiceError::Config(_))));
    }

    #[test]
    fn test_engine_follows_configured_policy() {
        let service = build(ServiceConfig {
            scoring: "raw_count".to_string(),
            request_timeout_ms: 250,
            ..ServiceConfig::default()
        })
        .unwrap();

        assert_eq!(service.engine().policy_name(), "raw_count");
        assert_eq!(service.config().scoring, "raw_count");
        assert_eq!(
            service.bus().default_timeout(),
            std::time::Duration::from_millis(250)
        );
    }

    #[test]
    fn test_registry_has_one_route_per_topic() {
        let service = build(ServiceConfig::default()).unwrap();
        let registry = service.registry().unwrap();
        assert_eq!(
            registry.topics(),
            vec![
                topics::ENTRY_UPDATED,
                topics::GET_VELOCITY,
                topics::INCREMENT_DAILY_COUNTER,
            ]
        );
    }
}
