//! The engine facade: shared state, persistence and bootstrap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tabtrail_types::{HostCapabilities, TabId, TabQuery, WindowId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::feed::PresentationFeed;
use crate::host::{history_key, KvStore, TabHost};
use crate::managers::ManagerRegistry;
use crate::menu::MenuBuilder;
use crate::reconciler::{ReconcileState, Reconciler};
use crate::store::{decode_entries, rederive, seed_order, HistoryStore, WindowHistory, DEFAULT_HISTORY_CAPACITY};
use crate::{EngineError, Result};

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub history_capacity: usize,
    /// Tab entries shown in the context menu.
    pub menu_limit: usize,
    pub menu_title_max: usize,
    /// Safety net for a menu rebuild stuck in the host.
    pub menu_lock_timeout: Duration,
    /// Extension page hosting the tab manager.
    pub manager_page: String,
    pub manager_width: u32,
    pub manager_height: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            menu_limit: 20,
            menu_title_max: 50,
            menu_lock_timeout: Duration::from_millis(15000),
            manager_page: "tab_manager.html".to_string(),
            manager_width: 420,
            manager_height: 600,
        }
    }
}

/// Mutable engine state. Never held across a host call.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) history: HistoryStore,
    pub(crate) reconciler: Reconciler,
    pub(crate) managers: ManagerRegistry,
    pub(crate) capabilities: HostCapabilities,
}

/// The MRU history engine.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) host: Arc<dyn TabHost>,
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) feed: PresentationFeed,
    pub(crate) menu: MenuBuilder,
}

impl Engine {
    pub fn new(config: EngineConfig, host: Arc<dyn TabHost>, store: Arc<dyn KvStore>) -> Self {
        let state = EngineState {
            history: HistoryStore::new(config.history_capacity),
            reconciler: Reconciler::new(),
            managers: ManagerRegistry::new(),
            capabilities: HostCapabilities::default(),
        };
        let menu = MenuBuilder::new(config.menu_lock_timeout);
        Self {
            config,
            host,
            store,
            state: Mutex::new(state),
            feed: PresentationFeed::new(),
            menu,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn menu_rebuilds(&self) -> u64 {
        self.menu.rebuild_count()
    }

    pub async fn capabilities(&self) -> HostCapabilities {
        self.state.lock().await.capabilities
    }

    /// History entries of a window, most recent first.
    pub async fn history(&self, window_id: WindowId) -> Option<Vec<TabId>> {
        let state = self.state.lock().await;
        state.history.get(window_id).map(|h| h.entries().to_vec())
    }

    pub async fn cursor(&self, window_id: WindowId) -> Option<usize> {
        let state = self.state.lock().await;
        state.history.get(window_id).and_then(WindowHistory::cursor)
    }

    pub async fn reconcile_state(&self, window_id: WindowId) -> ReconcileState {
        self.state.lock().await.reconciler.state(window_id)
    }

    pub async fn tracked_windows(&self) -> Vec<WindowId> {
        let mut ids = self.state.lock().await.history.window_ids();
        ids.sort_unstable();
        ids
    }

    /// Run `f` against a window's history; an unknown window reads as empty.
    pub(crate) async fn with_history<T>(
        &self,
        window_id: WindowId,
        f: impl FnOnce(&WindowHistory) -> T,
    ) -> T {
        let state = self.state.lock().await;
        match state.history.get(window_id) {
            Some(history) => f(history),
            None => f(&WindowHistory::new(state.history.capacity())),
        }
    }

    /// Last focused window, if the host reports one.
    pub(crate) async fn focused_window(&self) -> Option<WindowId> {
        match self.host.last_focused_window().await {
            Ok(window) => window.map(|w| w.id),
            Err(e) => {
                warn!(target: "tabtrail::history", "Failed to resolve focused window: {}", e);
                None
            }
        }
    }

    /// Make sure `window_id` has a history record, loading it from storage
    /// the first time the window is seen.
    pub(crate) async fn ensure_loaded(&self, window_id: WindowId) {
        if self.state.lock().await.history.contains(window_id) {
            return;
        }

        let persisted = match self.load_persisted(window_id).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(target: "tabtrail::history", "Failed to load history of window {}: {}", window_id, e);
                None
            }
        };

        let mut state = self.state.lock().await;
        // Another handler may have loaded it while storage was read.
        if state.history.contains(window_id) {
            return;
        }
        match persisted {
            Some(entries) => {
                debug!(target: "tabtrail::history", "Loaded {} entries for window {}", entries.len(), window_id);
                state.history.replace(window_id, entries);
            }
            None => {
                state.history.window_mut(window_id);
            }
        }
    }

    async fn load_persisted(&self, window_id: WindowId) -> Result<Option<Vec<TabId>>> {
        let key = history_key(window_id);
        let value = self
            .store
            .get(&key)
            .await
            .map_err(|e| EngineError::Storage(format!("{}: {}", key, e)))?;
        match value {
            Some(value) => match decode_entries(value) {
                Some(entries) => Ok(Some(entries)),
                None => {
                    warn!(target: "tabtrail::history", "Ignoring malformed history under {}", key);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Write a window's history to storage. Failures are logged.
    pub(crate) async fn persist(&self, window_id: WindowId) {
        if let Err(e) = self.try_persist(window_id).await {
            warn!(target: "tabtrail::history", "Failed to persist history of window {}: {}", window_id, e);
        }
    }

    async fn try_persist(&self, window_id: WindowId) -> Result<()> {
        let value = {
            let state = self.state.lock().await;
            match state.history.get(window_id) {
                Some(history) => history.to_value(),
                None => return Ok(()),
            }
        };
        let key = history_key(window_id);
        self.store
            .set(&key, value)
            .await
            .map_err(|e| EngineError::Storage(format!("{}: {}", key, e)))
    }

    /// Destroy every record of a closed window.
    pub(crate) async fn drop_window(&self, window_id: WindowId) {
        let existed = {
            let mut state = self.state.lock().await;
            state.reconciler.disarm(window_id);
            state.history.remove(window_id).is_some()
        };
        if let Err(e) = self.store.remove(&history_key(window_id)).await {
            warn!(target: "tabtrail::history", "Failed to remove stored history of window {}: {}", window_id, e);
        }
        if existed {
            debug!(target: "tabtrail::history", "Dropped history of window {}", window_id);
        }
    }

    /// Re-derive a window's history from a fresh tab enumeration. Returns
    /// whether the window has any tab.
    pub(crate) async fn repair(&self, window_id: WindowId) -> bool {
        match self.try_repair(window_id).await {
            Ok(repaired) => repaired,
            Err(e) => {
                warn!(target: "tabtrail::history", "Failed to repair history of window {}: {}", window_id, e);
                false
            }
        }
    }

    async fn try_repair(&self, window_id: WindowId) -> Result<bool> {
        let tabs = self.host.query_tabs(TabQuery::in_window(window_id)).await?;
        if tabs.is_empty() {
            return Ok(false);
        }
        let active = tabs.iter().find(|tab| tab.active).map(|tab| tab.id);
        {
            let mut state = self.state.lock().await;
            let existing = state
                .history
                .get(window_id)
                .map(|h| h.entries().to_vec())
                .unwrap_or_default();
            state.history.replace(window_id, rederive(&existing, &tabs));
            state.history.window_mut(window_id).set_active(active);
        }
        self.persist(window_id).await;
        info!(target: "tabtrail::history", "Repaired history of window {} from {} tabs", window_id, tabs.len());
        Ok(true)
    }

    /// Initialize every ordinary window from the host. With `reseed`, stored
    /// histories are discarded and rebuilt from the enumeration.
    pub async fn bootstrap(&self, capabilities: HostCapabilities, reseed: bool) {
        self.state.lock().await.capabilities = capabilities;

        let windows = match self.host.get_all_windows().await {
            Ok(windows) => windows,
            Err(e) => {
                warn!(target: "tabtrail::startup", "Failed to enumerate windows: {}", e);
                return;
            }
        };

        let mut seeded = 0;
        let mut resumed = 0;
        for window in windows.iter().filter(|w| w.is_normal()) {
            let persisted = if reseed {
                None
            } else {
                self.load_persisted(window.id).await.unwrap_or_else(|e| {
                    warn!(target: "tabtrail::startup", "Ignoring stored history of window {}: {}", window.id, e);
                    None
                })
            };
            let live: HashSet<TabId> = window.tabs.iter().map(|tab| tab.id).collect();
            let active = window.tabs.iter().find(|tab| tab.active).map(|tab| tab.id);

            {
                let mut state = self.state.lock().await;
                let mut restored = false;
                if let Some(entries) = persisted {
                    state.history.replace(window.id, entries);
                    let history = state.history.window_mut(window.id);
                    history.retain_live(&live);
                    restored = !history.is_empty();
                }
                if restored {
                    resumed += 1;
                } else {
                    state.history.replace(window.id, seed_order(&window.tabs));
                    seeded += 1;
                }
                let history = state.history.window_mut(window.id);
                history.set_active(active);
                history.set_cursor(None);
            }
            self.persist(window.id).await;
        }

        info!(
            target: "tabtrail::startup",
            "Bootstrapped {} windows ({} resumed, {} seeded)",
            resumed + seeded, resumed, seeded
        );

        if capabilities.context_menus {
            let target = windows
                .iter()
                .find(|w| w.focused)
                .or_else(|| windows.first())
                .map(|w| w.id);
            if let Some(window_id) = target {
                self.rebuild_menu(window_id).await;
            }
        }
    }

    /// Propagate a change in `window_id` to observers and, when the host has
    /// no "menu shown" hook, to the context menu.
    pub(crate) async fn after_change(&self, window_id: WindowId) {
        self.notify_observers(window_id).await;
        if self.capabilities().await.eager_menu_rebuild() {
            self.rebuild_menu(window_id).await;
        }
    }
}
