//! Shared application state.

use std::sync::Arc;

use tabtrail_core::{Engine, KvStore, MemoryStore, TabHost};

use crate::bridge::Bridge;
use crate::config::{Config, Persistence};
use crate::event_loop::ObserverQueue;

/// Shared application state.
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Engine-mutating requests from the observer feed go through the event loop.
    pub observers: ObserverQueue,
    pub config: Config,
}

impl AppState {
    pub fn new(
        config: Config,
        host: Arc<dyn TabHost>,
        store: Arc<dyn KvStore>,
        observers: ObserverQueue,
    ) -> Self {
        let engine = Arc::new(Engine::new(config.engine_config(), host, store));
        Self {
            engine,
            observers,
            config,
        }
    }

    /// State backed by the browser through `bridge`. Histories go to session
    /// storage unless the config keeps them in memory.
    pub fn with_bridge(config: Config, bridge: Arc<Bridge>, observers: ObserverQueue) -> Self {
        let store: Arc<dyn KvStore> = match config.persistence {
            Persistence::Session => bridge.clone(),
            Persistence::Memory => Arc::new(MemoryStore::new()),
        };
        Self::new(config, bridge, store, observers)
    }
}
