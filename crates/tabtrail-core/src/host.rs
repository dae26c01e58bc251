//! Collaborator seams: the browser's tab/window API and its key-value storage.

use async_trait::async_trait;
use serde_json::Value;
use tabtrail_types::{
    MenuItem, ObserverPush, TabId, TabInfo, TabQuery, WindowId, WindowInfo, WindowSpec,
};

use crate::HostError;

/// Tab, window, messaging and menu primitives provided by the browser.
#[async_trait]
pub trait TabHost: Send + Sync {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<TabInfo>, HostError>;

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError>;

    /// Make `tab_id` the active tab of its window. Fails with
    /// [`HostError::TabNotFound`] when the tab is gone.
    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn get_window(&self, window_id: WindowId) -> Result<WindowInfo, HostError>;

    /// Every window, populated with its tabs.
    async fn get_all_windows(&self) -> Result<Vec<WindowInfo>, HostError>;

    async fn last_focused_window(&self) -> Result<Option<WindowInfo>, HostError>;

    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError>;

    async fn create_window(&self, spec: WindowSpec) -> Result<WindowInfo, HostError>;

    /// Absolute URL of a page bundled with the extension.
    async fn extension_url(&self, path: &str) -> Result<String, HostError>;

    /// Push a notification to an extension page living in `tab_id`.
    async fn send_message(&self, tab_id: TabId, push: ObserverPush) -> Result<(), HostError>;

    async fn menu_remove_all(&self) -> Result<(), HostError>;

    async fn menu_create(&self, item: MenuItem) -> Result<(), HostError>;
}

/// Asynchronous key-value storage scoped to the browser session.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError>;

    async fn remove(&self, key: &str) -> Result<(), HostError>;
}

/// Storage key holding a window's history.
pub fn history_key(window_id: WindowId) -> String {
    format!("history_{}", window_id)
}

/// Active tab of a window, if the host reports one.
pub async fn active_tab(host: &dyn TabHost, window_id: WindowId) -> Result<Option<TabId>, HostError> {
    let tabs = host.query_tabs(TabQuery::active_in(window_id)).await?;
    Ok(tabs.first().map(|tab| tab.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_key_format() {
        assert_eq!(history_key(17), "history_17");
    }
}
