//! In-memory collaborators.
//!
//! `MemoryHost` models a browser: windows with tab strips, a focused window,
//! and the event queue the browser would emit. Nothing is delivered to the
//! engine automatically; callers drain the queue and feed it back, which
//! gives tests full control over event ordering.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tabtrail_types::{
    HostEvent, MenuItem, ObserverPush, TabId, TabInfo, TabQuery, WindowId, WindowInfo, WindowKind,
    WindowSpec,
};

use crate::host::{KvStore, TabHost};
use crate::HostError;

/// A structural change applied to the context menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOp {
    RemoveAll,
    Create(String),
}

#[derive(Debug)]
struct MemoryWindow {
    kind: WindowKind,
    /// Tab strip, left to right.
    tabs: Vec<TabInfo>,
}

#[derive(Debug, Default)]
struct Browser {
    windows: BTreeMap<WindowId, MemoryWindow>,
    focused: Option<WindowId>,
    events: VecDeque<HostEvent>,
    menu: Vec<MenuItem>,
    menu_log: Vec<MenuOp>,
    sent: Vec<(TabId, ObserverPush)>,
    activations: Vec<TabId>,
    next_window: WindowId,
    next_tab: TabId,
}

impl Browser {
    fn window_of(&self, tab_id: TabId) -> Option<WindowId> {
        self.windows
            .iter()
            .find(|(_, w)| w.tabs.iter().any(|t| t.id == tab_id))
            .map(|(&id, _)| id)
    }

    fn tab(&self, tab_id: TabId) -> Option<&TabInfo> {
        self.windows
            .values()
            .flat_map(|w| w.tabs.iter())
            .find(|t| t.id == tab_id)
    }

    fn info(&self, window_id: WindowId) -> Option<WindowInfo> {
        let window = self.windows.get(&window_id)?;
        Some(WindowInfo {
            id: window_id,
            kind: window.kind,
            focused: self.focused == Some(window_id),
            tabs: window.tabs.clone(),
        })
    }

    fn activate(&mut self, tab_id: TabId) -> Result<WindowId, HostError> {
        let window_id = self.window_of(tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        let now = chrono::Utc::now().timestamp_millis() as f64;
        let mut changed = false;
        if let Some(window) = self.windows.get_mut(&window_id) {
            for tab in window.tabs.iter_mut() {
                let active = tab.id == tab_id;
                changed |= active && !tab.active;
                tab.active = active;
                if active {
                    tab.last_accessed = Some(now);
                }
            }
        }
        // Re-activating the active tab is silent.
        if changed {
            self.events
                .push_back(HostEvent::TabActivated { tab_id, window_id });
        }
        Ok(window_id)
    }

    fn remove(&mut self, tab_id: TabId) -> Result<(), HostError> {
        let window_id = self.window_of(tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        if let Some(window) = self.windows.get_mut(&window_id) {
            window.tabs.retain(|t| t.id != tab_id);
            reindex(&mut window.tabs);
        }
        self.events.push_back(HostEvent::TabRemoved {
            tab_id,
            window_id,
            is_window_closing: false,
        });
        Ok(())
    }

    fn add_window(&mut self, kind: WindowKind) -> WindowId {
        self.next_window += 1;
        let window_id = self.next_window;
        self.windows.insert(
            window_id,
            MemoryWindow {
                kind,
                tabs: Vec::new(),
            },
        );
        if self.focused.is_none() {
            self.focused = Some(window_id);
        }
        window_id
    }

    fn add_tab(&mut self, window_id: WindowId, title: &str, url: &str) -> Option<TabInfo> {
        self.next_tab += 1;
        let window = self.windows.get_mut(&window_id)?;
        let tab = TabInfo {
            id: self.next_tab,
            window_id,
            index: window.tabs.len() as u32,
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            pending_url: None,
            fav_icon_url: None,
            active: false,
            last_accessed: None,
        };
        window.tabs.push(tab.clone());
        Some(tab)
    }
}

fn reindex(tabs: &mut [TabInfo]) {
    for (index, tab) in tabs.iter_mut().enumerate() {
        tab.index = index as u32;
    }
}

/// A scripted browser.
#[derive(Debug, Default)]
pub struct MemoryHost {
    browser: Mutex<Browser>,
    latency: Option<Duration>,
    stall_menu: AtomicBool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` first, letting concurrent callers
    /// interleave.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    fn browser(&self) -> MutexGuard<'_, Browser> {
        self.browser.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Menu calls never complete while stalled.
    pub fn set_stall_menu(&self, stall: bool) {
        self.stall_menu.store(stall, Ordering::SeqCst);
    }

    async fn menu_gate(&self) {
        if self.stall_menu.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    pub fn add_window(&self, kind: WindowKind) -> WindowId {
        self.browser().add_window(kind)
    }

    /// Append a tab to a window's strip, queueing its creation event.
    /// Returns -1 when the window does not exist.
    pub fn open_tab(&self, window_id: WindowId, title: &str) -> TabId {
        let mut browser = self.browser();
        let url = format!("https://example.com/{}", title.to_lowercase().replace(' ', "-"));
        match browser.add_tab(window_id, title, &url) {
            Some(tab) => {
                let tab_id = tab.id;
                browser.events.push_back(HostEvent::TabCreated { tab });
                tab_id
            }
            None => -1,
        }
    }

    /// The user clicks a tab.
    pub fn user_activates(&self, tab_id: TabId) {
        let _ = self.browser().activate(tab_id);
    }

    /// The user closes a tab. The window is left without an active tab.
    pub fn user_closes(&self, tab_id: TabId) {
        let _ = self.browser().remove(tab_id);
    }

    /// The user closes a window with all its tabs.
    pub fn user_closes_window(&self, window_id: WindowId) {
        let mut browser = self.browser();
        let Some(window) = browser.windows.remove(&window_id) else {
            return;
        };
        for tab in window.tabs {
            browser.events.push_back(HostEvent::TabRemoved {
                tab_id: tab.id,
                window_id,
                is_window_closing: true,
            });
        }
        browser
            .events
            .push_back(HostEvent::WindowRemoved { window_id });
        if browser.focused == Some(window_id) {
            browser.focused = browser.windows.keys().next().copied();
        }
    }

    /// The user focuses a window.
    pub fn user_focuses(&self, window_id: WindowId) {
        let mut browser = self.browser();
        browser.focused = Some(window_id);
        browser
            .events
            .push_back(HostEvent::WindowFocusChanged { window_id });
    }

    /// A tab disappears without the browser reporting it yet.
    pub fn vanish_tab(&self, tab_id: TabId) {
        let mut browser = self.browser();
        for window in browser.windows.values_mut() {
            window.tabs.retain(|t| t.id != tab_id);
            reindex(&mut window.tabs);
        }
    }

    pub fn take_events(&self) -> Vec<HostEvent> {
        self.browser().events.drain(..).collect()
    }

    pub fn tab(&self, tab_id: TabId) -> Option<TabInfo> {
        self.browser().tab(tab_id).cloned()
    }

    pub fn active_tab(&self, window_id: WindowId) -> Option<TabId> {
        let browser = self.browser();
        browser
            .windows
            .get(&window_id)?
            .tabs
            .iter()
            .find(|t| t.active)
            .map(|t| t.id)
    }

    pub fn tab_ids(&self, window_id: WindowId) -> Vec<TabId> {
        let browser = self.browser();
        browser
            .windows
            .get(&window_id)
            .map(|w| w.tabs.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.browser().windows.keys().copied().collect()
    }

    pub fn menu(&self) -> Vec<MenuItem> {
        self.browser().menu.clone()
    }

    pub fn menu_log(&self) -> Vec<MenuOp> {
        self.browser().menu_log.clone()
    }

    pub fn sent_messages(&self) -> Vec<(TabId, ObserverPush)> {
        self.browser().sent.clone()
    }

    /// Tabs activated through [`TabHost::activate_tab`], in order.
    pub fn activation_log(&self) -> Vec<TabId> {
        self.browser().activations.clone()
    }
}

#[async_trait]
impl TabHost for MemoryHost {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<TabInfo>, HostError> {
        self.delay().await;
        let browser = self.browser();
        Ok(browser
            .windows
            .iter()
            .filter(|&(&id, _)| query.window_id.is_none_or(|w| w == id))
            .flat_map(|(_, w)| w.tabs.iter())
            .filter(|t| query.active.is_none_or(|a| a == t.active))
            .cloned()
            .collect())
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        self.delay().await;
        self.tab(tab_id).ok_or(HostError::TabNotFound(tab_id))
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.delay().await;
        let mut browser = self.browser();
        browser.activate(tab_id)?;
        browser.activations.push(tab_id);
        Ok(())
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.delay().await;
        self.browser().remove(tab_id)
    }

    async fn get_window(&self, window_id: WindowId) -> Result<WindowInfo, HostError> {
        self.delay().await;
        self.browser()
            .info(window_id)
            .ok_or(HostError::WindowNotFound(window_id))
    }

    async fn get_all_windows(&self) -> Result<Vec<WindowInfo>, HostError> {
        self.delay().await;
        let browser = self.browser();
        Ok(browser
            .windows
            .keys()
            .filter_map(|&id| browser.info(id))
            .collect())
    }

    async fn last_focused_window(&self) -> Result<Option<WindowInfo>, HostError> {
        self.delay().await;
        let browser = self.browser();
        Ok(browser.focused.and_then(|id| browser.info(id)))
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError> {
        self.delay().await;
        let mut browser = self.browser();
        if !browser.windows.contains_key(&window_id) {
            return Err(HostError::WindowNotFound(window_id));
        }
        browser.focused = Some(window_id);
        browser
            .events
            .push_back(HostEvent::WindowFocusChanged { window_id });
        Ok(())
    }

    async fn create_window(&self, spec: WindowSpec) -> Result<WindowInfo, HostError> {
        self.delay().await;
        let mut browser = self.browser();
        let window_id = browser.add_window(spec.kind);
        if let Some(tab) = browser.add_tab(window_id, "", &spec.url) {
            browser.events.push_back(HostEvent::TabCreated { tab });
        }
        browser.focused = Some(window_id);
        browser
            .info(window_id)
            .ok_or(HostError::WindowNotFound(window_id))
    }

    async fn extension_url(&self, path: &str) -> Result<String, HostError> {
        Ok(format!("chrome-extension://tabtrail/{}", path))
    }

    async fn send_message(&self, tab_id: TabId, push: ObserverPush) -> Result<(), HostError> {
        self.delay().await;
        let mut browser = self.browser();
        if browser.tab(tab_id).is_none() {
            return Err(HostError::TabNotFound(tab_id));
        }
        browser.sent.push((tab_id, push));
        Ok(())
    }

    async fn menu_remove_all(&self) -> Result<(), HostError> {
        self.menu_gate().await;
        self.delay().await;
        let mut browser = self.browser();
        browser.menu.clear();
        browser.menu_log.push(MenuOp::RemoveAll);
        Ok(())
    }

    async fn menu_create(&self, item: MenuItem) -> Result<(), HostError> {
        self.menu_gate().await;
        self.delay().await;
        let mut browser = self.browser();
        if browser.menu.iter().any(|existing| existing.id == item.id) {
            return Err(HostError::CallFailed {
                op: "menu_create".to_string(),
                message: format!("duplicate id {}", item.id),
            });
        }
        browser.menu_log.push(MenuOp::Create(item.id.clone()));
        browser.menu.push(item);
        Ok(())
    }
}

/// Session storage kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.values().insert(key.into(), value);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values().get(key).cloned()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.values().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HostError> {
        self.values().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_activate_closed_tab_is_not_found() {
        let host = MemoryHost::new();
        let window = host.add_window(WindowKind::Normal);
        let tab = host.open_tab(window, "A");
        host.vanish_tab(tab);

        assert_eq!(host.activate_tab(tab).await, Err(HostError::TabNotFound(tab)));
    }

    #[tokio::test]
    async fn test_activation_queues_event() {
        let host = MemoryHost::new();
        let window = host.add_window(WindowKind::Normal);
        let a = host.open_tab(window, "A");
        let b = host.open_tab(window, "B");
        host.take_events();

        host.activate_tab(b).await.unwrap();
        assert_eq!(host.active_tab(window), Some(b));
        assert_eq!(
            host.take_events(),
            vec![HostEvent::TabActivated {
                tab_id: b,
                window_id: window
            }]
        );
        host.user_activates(a);
        assert_eq!(host.active_tab(window), Some(a));
        assert_eq!(host.activation_log(), vec![b]);
    }

    #[tokio::test]
    async fn test_activating_active_tab_queues_nothing() {
        let host = MemoryHost::new();
        let window = host.add_window(WindowKind::Normal);
        let a = host.open_tab(window, "A");
        host.user_activates(a);
        host.take_events();

        host.activate_tab(a).await.unwrap();
        host.user_activates(a);
        assert!(host.take_events().is_empty());
        assert_eq!(host.active_tab(window), Some(a));
    }

    #[tokio::test]
    async fn test_query_filters() {
        let host = MemoryHost::new();
        let w1 = host.add_window(WindowKind::Normal);
        let w2 = host.add_window(WindowKind::Normal);
        let a = host.open_tab(w1, "A");
        host.open_tab(w1, "B");
        host.open_tab(w2, "C");
        host.user_activates(a);

        assert_eq!(host.query_tabs(TabQuery::in_window(w1)).await.unwrap().len(), 2);
        assert_eq!(host.query_tabs(TabQuery::default()).await.unwrap().len(), 3);
        let active = host.query_tabs(TabQuery::active_in(w1)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a);
    }

    #[tokio::test]
    async fn test_close_window_emits_closing_removals() {
        let host = MemoryHost::new();
        let window = host.add_window(WindowKind::Normal);
        let a = host.open_tab(window, "A");
        host.take_events();

        host.user_closes_window(window);
        assert_eq!(
            host.take_events(),
            vec![
                HostEvent::TabRemoved {
                    tab_id: a,
                    window_id: window,
                    is_window_closing: true
                },
                HostEvent::WindowRemoved { window_id: window },
            ]
        );
        assert!(host.window_ids().is_empty());
    }

    #[tokio::test]
    async fn test_menu_rejects_duplicate_ids() {
        let host = MemoryHost::new();
        host.menu_create(MenuItem::action("a", None, "A")).await.unwrap();
        assert!(host.menu_create(MenuItem::action("a", None, "A")).await.is_err());
        host.menu_remove_all().await.unwrap();
        assert!(host.menu().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("history_1", serde_json::json!([1, 2])).await.unwrap();
        assert_eq!(store.get("history_1").await.unwrap(), Some(serde_json::json!([1, 2])));
        store.remove("history_1").await.unwrap();
        assert_eq!(store.get("history_1").await.unwrap(), None);
    }
}
