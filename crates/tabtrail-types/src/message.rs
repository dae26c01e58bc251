//! Message protocol between the engine and presentation surfaces
//! (popup, manager window, WebSocket observers).

use serde::{Deserialize, Serialize};

use crate::{TabId, TabInfo, WindowId};

/// Requests sent by an observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObserverRequest {
    /// Ordered tab list for a window; defaults to the sender's window.
    GetHistory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_id: Option<WindowId>,
    },
    /// Activate a tab. With `preserve_history` the MRU order is left alone.
    ActivateTab {
        tab_id: TabId,
        #[serde(default)]
        preserve_history: bool,
    },
    /// Close a tab.
    CloseTab { tab_id: TabId },
    /// The sending tab starts observing `window_id`.
    RegisterManager { window_id: WindowId },
    /// The sending tab stops observing.
    UnregisterManager,
}

/// Replies to observer requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObserverResponse {
    History { tabs: Vec<TabEntry> },
    Ack,
}

impl ObserverResponse {
    pub fn empty_history() -> Self {
        ObserverResponse::History { tabs: Vec::new() }
    }
}

/// Notifications pushed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObserverPush {
    /// The window's history or tab metadata changed; re-request the snapshot.
    HistoryUpdated { window_id: WindowId },
}

impl ObserverPush {
    pub fn window_id(&self) -> WindowId {
        match self {
            ObserverPush::HistoryUpdated { window_id } => *window_id,
        }
    }
}

/// One row of a history snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabEntry {
    pub id: TabId,
    pub title: String,
    pub fav_icon_url: String,
    pub url: String,
    pub active: bool,
}

impl From<&TabInfo> for TabEntry {
    fn from(tab: &TabInfo) -> Self {
        Self {
            id: tab.id,
            title: tab.display_title().to_string(),
            fav_icon_url: tab.fav_icon_url.clone().unwrap_or_default(),
            url: tab.display_url().to_string(),
            active: tab.active,
        }
    }
}

/// Origin of a relayed observer message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
}
