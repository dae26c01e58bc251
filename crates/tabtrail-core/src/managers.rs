//! Registry of manager pages observing a window's history.

use std::collections::HashMap;

use tabtrail_types::{TabId, TabQuery, WindowId, WindowKind, WindowSpec};
use tracing::{debug, info, warn};

use crate::{Engine, HostError};

/// Which manager tabs observe which windows.
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    /// Observer tab -> observed window.
    observers: HashMap<TabId, WindowId>,
    /// Observed window -> window hosting its manager.
    window_by_target: HashMap<WindowId, WindowId>,
    /// Manager window -> observed window.
    target_by_window: HashMap<WindowId, WindowId>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `observer` (living in `observer_window`) watches `target`.
    pub fn register(&mut self, observer: TabId, observer_window: Option<WindowId>, target: WindowId) {
        self.observers.insert(observer, target);
        if let Some(window_id) = observer_window {
            if let Some(stale) = self.window_by_target.insert(target, window_id) {
                if stale != window_id {
                    self.target_by_window.remove(&stale);
                }
            }
            self.target_by_window.insert(window_id, target);
        }
    }

    /// Drop an observer. Returns the window it watched.
    pub fn unregister(&mut self, observer: TabId, observer_window: Option<WindowId>) -> Option<WindowId> {
        let target = self.observers.remove(&observer)?;
        if let Some(window_id) = observer_window {
            self.forget_manager_window(window_id);
        }
        Some(target)
    }

    /// An observer's tab closed.
    pub fn on_tab_removed(&mut self, tab_id: TabId) -> Option<WindowId> {
        self.observers.remove(&tab_id)
    }

    /// A window closed: forget it as a manager window.
    pub fn on_window_removed(&mut self, window_id: WindowId) {
        self.forget_manager_window(window_id);
    }

    fn forget_manager_window(&mut self, window_id: WindowId) {
        if let Some(target) = self.target_by_window.remove(&window_id) {
            if self.window_by_target.get(&target) == Some(&window_id) {
                self.window_by_target.remove(&target);
            }
        }
    }

    /// The manager window recorded for `target` turned out to be gone.
    pub fn forget_target(&mut self, target: WindowId) {
        if let Some(window_id) = self.window_by_target.remove(&target) {
            self.target_by_window.remove(&window_id);
        }
    }

    /// Tabs observing `target`.
    pub fn observers_of(&self, target: WindowId) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self
            .observers
            .iter()
            .filter(|&(_, &watched)| watched == target)
            .map(|(&tab_id, _)| tab_id)
            .collect();
        tabs.sort_unstable();
        tabs
    }

    /// Window observed by the manager window `window_id`.
    pub fn target_for(&self, window_id: WindowId) -> Option<WindowId> {
        self.target_by_window.get(&window_id).copied()
    }

    pub fn manager_window_for(&self, target: WindowId) -> Option<WindowId> {
        self.window_by_target.get(&target).copied()
    }

    pub fn is_manager_window(&self, window_id: WindowId) -> bool {
        self.target_by_window.contains_key(&window_id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Engine {
    /// Whether `window_id` hosts a manager page.
    pub async fn is_manager_window(&self, window_id: WindowId) -> bool {
        if self.state.lock().await.managers.is_manager_window(window_id) {
            return true;
        }
        match self.host.query_tabs(TabQuery::in_window(window_id)).await {
            Ok(tabs) => tabs
                .iter()
                .any(|tab| tab.shows_page(&self.config.manager_page)),
            Err(_) => false,
        }
    }

    /// Focus the manager observing `target`, or open a new one.
    pub async fn open_manager(&self, target: WindowId) {
        let existing = self.state.lock().await.managers.manager_window_for(target);
        if let Some(window_id) = existing {
            match self.focus_manager(window_id).await {
                Ok(()) => {
                    debug!(target: "tabtrail::feed", "Focused manager window {} for window {}", window_id, target);
                    return;
                }
                Err(e) => {
                    debug!(target: "tabtrail::feed", "Manager window {} is gone: {}", window_id, e);
                    self.state.lock().await.managers.forget_target(target);
                }
            }
        }

        let path = format!("{}?windowId={}", self.config.manager_page, target);
        let url = match self.host.extension_url(&path).await {
            Ok(url) => url,
            Err(e) => {
                warn!(target: "tabtrail::feed", "Failed to resolve manager page: {}", e);
                return;
            }
        };
        let spec = WindowSpec {
            url,
            kind: WindowKind::Popup,
            width: self.config.manager_width,
            height: self.config.manager_height,
        };
        match self.host.create_window(spec).await {
            Ok(window) => {
                info!(target: "tabtrail::feed", "Opened manager window {} for window {}", window.id, target)
            }
            Err(e) => warn!(target: "tabtrail::feed", "Failed to open manager for window {}: {}", target, e),
        }
    }

    async fn focus_manager(&self, window_id: WindowId) -> Result<(), HostError> {
        self.host.focus_window(window_id).await?;
        let tabs = self.host.query_tabs(TabQuery::in_window(window_id)).await?;
        if let Some(first) = tabs.first() {
            self.host.activate_tab(first.id).await?;
        }
        Ok(())
    }
}
