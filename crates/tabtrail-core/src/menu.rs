//! Context-menu tree for the toolbar action.
//!
//! The menu is a degenerate observer: it is rebuilt from the ordered view of a
//! window. The host's menu API does not tolerate concurrent structural
//! changes, so rebuilds are serialized behind a FIFO gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tabtrail_types::{MenuItem, TabId, TabInfo, WindowId};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::Engine;

pub const MENU_ROOT_ID: &str = "tab-history-root";
pub const MENU_ROOT_TITLE: &str = "Tab History";
pub const OPEN_MANAGER_ID: &str = "open-tab-manager";
pub const OPEN_MANAGER_TITLE: &str = "Open Tab Manager";
pub const ACTIVE_MARKER: &str = "> ";

const TAB_ITEM_PREFIX: &str = "tab-";
const ELLIPSIS: &str = "...";

/// What a clicked menu item asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ActivateTab(TabId),
    OpenManager,
}

pub fn tab_item_id(tab_id: TabId) -> String {
    format!("{}{}", TAB_ITEM_PREFIX, tab_id)
}

/// Decode a clicked item identifier. The root and unknown items yield `None`.
pub fn parse_menu_item(id: &str) -> Option<MenuAction> {
    if id == OPEN_MANAGER_ID {
        return Some(MenuAction::OpenManager);
    }
    id.strip_prefix(TAB_ITEM_PREFIX)?
        .parse()
        .ok()
        .map(MenuAction::ActivateTab)
}

/// Shorten `title` to at most `max` characters, ending in "..." when cut.
pub fn truncate_title(title: &str, max: usize) -> String {
    if title.chars().count() <= max {
        return title.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut short: String = title.chars().take(keep).collect();
    short.push_str(ELLIPSIS);
    short
}

/// Full item list for a window: the root, up to `limit` tabs in history
/// order, then the manager entry.
pub fn build_menu(tabs: &[TabInfo], limit: usize, title_max: usize) -> Vec<MenuItem> {
    let mut items = Vec::with_capacity(tabs.len().min(limit) + 2);
    items.push(MenuItem::action(MENU_ROOT_ID, None, MENU_ROOT_TITLE));

    for tab in tabs.iter().take(limit) {
        let title = truncate_title(tab.display_title(), title_max);
        let title = if tab.active {
            format!("{}{}", ACTIVE_MARKER, title)
        } else {
            title
        };
        items.push(MenuItem::action(tab_item_id(tab.id), Some(MENU_ROOT_ID), title));
    }

    items.push(MenuItem::action(OPEN_MANAGER_ID, None, OPEN_MANAGER_TITLE));
    items
}

/// Serializes menu rebuilds.
#[derive(Debug)]
pub struct MenuBuilder {
    gate: Mutex<()>,
    lock_timeout: Duration,
    rebuilds: AtomicU64,
}

impl MenuBuilder {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            gate: Mutex::new(()),
            lock_timeout,
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Completed or abandoned rebuilds.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }
}

impl Engine {
    /// Rebuild the context menu from `window_id`'s ordered view. Queues
    /// behind any rebuild in flight; a rebuild stuck in the host is abandoned
    /// after the lock timeout so later ones can proceed.
    pub async fn rebuild_menu(&self, window_id: WindowId) {
        if !self.capabilities().await.context_menus {
            return;
        }

        let _gate = self.menu.gate.lock().await;
        if tokio::time::timeout(self.menu.lock_timeout, self.apply_menu(window_id))
            .await
            .is_err()
        {
            warn!(
                target: "tabtrail::menu",
                "Menu rebuild for window {} did not finish within {:?}, releasing lock",
                window_id, self.menu.lock_timeout
            );
        }
        self.menu.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    async fn apply_menu(&self, window_id: WindowId) {
        if let Err(e) = self.host.menu_remove_all().await {
            warn!(target: "tabtrail::menu", "Failed to clear menu: {}", e);
        }

        let tabs = match self.ordered_tabs(window_id).await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!(target: "tabtrail::menu", "Failed to list tabs of window {}: {}", window_id, e);
                Vec::new()
            }
        };

        let items = build_menu(&tabs, self.config.menu_limit, self.config.menu_title_max);
        let count = items.len();
        for item in items {
            let id = item.id.clone();
            if let Err(e) = self.host.menu_create(item).await {
                warn!(target: "tabtrail::menu", "Failed to create menu item {}: {}", id, e);
            }
        }
        trace!(target: "tabtrail::menu", "Menu for window {} rebuilt with {} items", window_id, count);
    }

    /// Handle a click on one of our menu items.
    pub async fn on_menu_clicked(&self, menu_item_id: &str, tab: Option<TabInfo>) {
        match parse_menu_item(menu_item_id) {
            Some(MenuAction::ActivateTab(tab_id)) => {
                self.activate_preserving_order(tab_id).await;
            }
            Some(MenuAction::OpenManager) => {
                let target = match tab {
                    Some(tab) => Some(tab.window_id),
                    None => self.focused_window().await,
                };
                if let Some(target) = target {
                    self.open_manager(target).await;
                }
            }
            None => debug!(target: "tabtrail::menu", "Ignoring click on menu item {}", menu_item_id),
        }
    }
}
