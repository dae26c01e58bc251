//! Routing of host events and user commands into the engine.
//!
//! Handlers never fail: host errors are logged and the event is dropped or
//! applied partially.

use tabtrail_types::{
    HostEvent, TabChange, TabId, TabInfo, TabQuery, UserCommand, WindowId, WINDOW_ID_NONE,
};
use tracing::{debug, info, trace, warn};

use crate::reconciler::Activation;
use crate::store::ordered_view;
use crate::{Engine, HostError};

impl Engine {
    /// Apply one event from the browser.
    pub async fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::Hello { capabilities } => {
                info!(
                    target: "tabtrail::startup",
                    "Host connected (context menus: {}, menu shown event: {})",
                    capabilities.context_menus, capabilities.menu_shown_event
                );
                self.bootstrap(capabilities, false).await;
            }
            HostEvent::Installed => {
                let capabilities = self.capabilities().await;
                self.bootstrap(capabilities, true).await;
            }
            HostEvent::TabActivated { tab_id, window_id } => {
                if self.tracks_window(window_id).await {
                    self.on_tab_activated(window_id, tab_id).await;
                } else {
                    trace!(target: "tabtrail::reconcile", "Ignoring activation in window {}", window_id);
                }
            }
            HostEvent::TabCreated { tab } => self.on_tab_created(tab).await,
            HostEvent::TabUpdated { tab_id, change, tab } => {
                self.on_tab_updated(tab_id, change, tab).await
            }
            HostEvent::TabRemoved {
                tab_id,
                window_id,
                is_window_closing,
            } => {
                self.on_tab_removed(tab_id, window_id, is_window_closing)
                    .await
            }
            HostEvent::WindowRemoved { window_id } => self.on_window_removed(window_id).await,
            HostEvent::WindowFocusChanged { window_id } => {
                self.on_window_focus_changed(window_id).await
            }
            HostEvent::ActionClicked { tab } => self.on_action_clicked(tab).await,
            HostEvent::Command { command } => self.on_command(command).await,
            HostEvent::MenuShown { tab } => self.on_menu_shown(tab).await,
            HostEvent::MenuClicked { menu_item_id, tab } => {
                self.on_menu_clicked(&menu_item_id, tab).await
            }
        }
    }

    /// Only ordinary windows that do not host a manager page keep a history.
    async fn tracks_window(&self, window_id: WindowId) -> bool {
        if window_id == WINDOW_ID_NONE || self.is_manager_window(window_id).await {
            return false;
        }
        match self.host.get_window(window_id).await {
            Ok(window) => window.is_normal(),
            Err(e) if e.is_stale() => false,
            Err(e) => {
                debug!(target: "tabtrail::reconcile", "Cannot inspect window {}: {}", window_id, e);
                true
            }
        }
    }

    pub async fn on_tab_activated(&self, window_id: WindowId, tab_id: TabId) {
        self.ensure_loaded(window_id).await;

        let outcome = {
            let mut state = self.state.lock().await;
            let state = &mut *state;
            state
                .reconciler
                .on_activated(&mut state.history, window_id, tab_id)
        };
        debug!(target: "tabtrail::reconcile", "Window {} activated tab {}: {:?}", window_id, tab_id, outcome);

        if outcome.reordered() {
            self.persist(window_id).await;
        }
        if let Activation::Remembered { moved_from } = &outcome {
            for &other in moved_from {
                self.persist(other).await;
                self.notify_observers(other).await;
            }
        }
        self.after_change(window_id).await;
    }

    pub async fn on_tab_created(&self, tab: TabInfo) {
        self.ensure_loaded(tab.window_id).await;
        self.after_change(tab.window_id).await;
    }

    pub async fn on_tab_updated(&self, tab_id: TabId, change: TabChange, tab: TabInfo) {
        if !change.affects_presentation() {
            return;
        }
        trace!(target: "tabtrail::feed", "Tab {} updated", tab_id);
        self.ensure_loaded(tab.window_id).await;
        self.after_change(tab.window_id).await;
    }

    /// Forget a closed tab. When it was the active one, the most recent live
    /// tab of the window is activated.
    pub async fn on_tab_removed(&self, tab_id: TabId, window_id: WindowId, is_window_closing: bool) {
        self.state.lock().await.managers.on_tab_removed(tab_id);

        if is_window_closing {
            self.drop_window(window_id).await;
            return;
        }

        self.ensure_loaded(window_id).await;
        let was_active = {
            let mut state = self.state.lock().await;
            let history = state.history.window_mut(window_id);
            let was_active = history.active() == Some(tab_id);
            history.forget(tab_id);
            was_active
        };
        debug!(target: "tabtrail::history", "Tab {} removed from window {} (active: {})", tab_id, window_id, was_active);

        if was_active {
            match self.removal_candidates(window_id, tab_id).await {
                Ok(candidates) if !candidates.is_empty() => {
                    if let Some(next) = self.activate_first_available(window_id, candidates, false).await {
                        debug!(target: "tabtrail::nav", "Window {} falls back to tab {}", window_id, next);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(target: "tabtrail::nav", "Failed to list tabs of window {}: {}", window_id, e),
            }
        }

        self.persist(window_id).await;
        self.after_change(window_id).await;
    }

    async fn removal_candidates(&self, window_id: WindowId, removed: TabId) -> Result<Vec<TabId>, HostError> {
        let live = self.host.query_tabs(TabQuery::in_window(window_id)).await?;
        let entries = self.with_history(window_id, |h| h.entries().to_vec()).await;
        Ok(fallback_order(&entries, live, removed))
    }

    pub async fn on_window_removed(&self, window_id: WindowId) {
        self.state.lock().await.managers.on_window_removed(window_id);
        self.drop_window(window_id).await;
    }

    pub async fn on_window_focus_changed(&self, window_id: WindowId) {
        if window_id == WINDOW_ID_NONE {
            return;
        }
        self.ensure_loaded(window_id).await;
        if self.capabilities().await.context_menus {
            self.rebuild_menu(window_id).await;
        }
    }

    /// Toolbar click. From the front of the history it swaps to the previous
    /// tab; mid-walk it returns to the front without reordering.
    pub async fn on_action_clicked(&self, tab: TabInfo) {
        let window_id = tab.window_id;
        self.ensure_loaded(window_id).await;

        let mut front = self.with_history(window_id, |h| h.front()).await;
        if front.is_none() && self.repair(window_id).await {
            front = self.with_history(window_id, |h| h.front()).await;
        }
        let Some(front) = front else {
            return;
        };

        if front == tab.id {
            self.switch_to_previous(window_id).await;
            return;
        }

        let candidates = self.with_history(window_id, |h| h.entries().to_vec()).await;
        if let Some(tab_id) = self.activate_first_available(window_id, candidates, true).await {
            let mut state = self.state.lock().await;
            if let Some(history) = state.history.get_mut(window_id) {
                history.point_at(tab_id);
            }
        }
    }

    /// Keyboard command. In a manager window it acts on the observed window.
    pub async fn on_command(&self, command: UserCommand) {
        let Some(focused) = self.focused_window().await else {
            debug!(target: "tabtrail::nav", "No focused window for {:?}", command);
            return;
        };
        let observed = self.state.lock().await.managers.target_for(focused);
        let window_id = observed.unwrap_or(focused);

        match command.delta() {
            Some(delta) => {
                self.step(window_id, delta).await;
            }
            None => {
                if observed.is_none() && self.is_manager_window(focused).await {
                    debug!(target: "tabtrail::nav", "Window {} is a manager window", focused);
                    return;
                }
                self.open_manager(window_id).await;
            }
        }
    }

    pub async fn on_menu_shown(&self, tab: Option<TabInfo>) {
        let window_id = match tab {
            Some(tab) => Some(tab.window_id),
            None => self.focused_window().await,
        };
        if let Some(window_id) = window_id {
            self.ensure_loaded(window_id).await;
            self.rebuild_menu(window_id).await;
        }
    }
}

/// Live tabs ordered for a fallback activation, excluding `removed`.
pub fn fallback_order(entries: &[TabId], live: Vec<TabInfo>, removed: TabId) -> Vec<TabId> {
    ordered_view(entries, live)
        .into_iter()
        .map(|tab| tab.id)
        .filter(|&id| id != removed)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: TabId, index: u32) -> TabInfo {
        TabInfo {
            id,
            window_id: 1,
            index,
            title: None,
            url: None,
            pending_url: None,
            fav_icon_url: None,
            active: false,
            last_accessed: None,
        }
    }

    #[test]
    fn test_fallback_order_prefers_history() {
        let live = vec![tab(1, 0), tab(2, 1), tab(3, 2)];
        assert_eq!(fallback_order(&[3, 1], live, 9), vec![3, 1, 2]);
    }

    #[test]
    fn test_fallback_order_skips_removed_tab_still_listed() {
        let live = vec![tab(1, 0), tab(2, 1)];
        assert_eq!(fallback_order(&[2, 1], live, 2), vec![1]);
        assert!(fallback_order(&[], vec![tab(5, 0)], 5).is_empty());
    }
}
