//! Tab and window descriptors as reported by the browser.

use serde::{Deserialize, Serialize};

/// Browser-assigned tab identifier.
pub type TabId = i64;

/// Browser-assigned window identifier.
pub type WindowId = i64;

/// Sentinel the browser uses when focus leaves every browser window.
pub const WINDOW_ID_NONE: WindowId = -1;

/// Title shown when a tab has neither a title nor a URL yet.
pub const UNTITLED: &str = "(Untitled)";

/// Kind of browser window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Ordinary tabbed window.
    #[default]
    Normal,
    Popup,
    Panel,
    App,
    Devtools,
}

/// A tab descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    /// Position in the window's tab strip.
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// URL the tab is navigating to before it commits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub active: bool,
    /// Last access time in ms since Unix epoch, when the browser reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<f64>,
}

impl TabInfo {
    /// Title to display: title, then pending URL, then URL, then a placeholder.
    pub fn display_title(&self) -> &str {
        [&self.title, &self.pending_url, &self.url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or(UNTITLED)
    }

    /// URL to display, falling back to the pending URL.
    pub fn display_url(&self) -> &str {
        [&self.url, &self.pending_url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    /// Whether the tab currently shows the given extension page.
    pub fn shows_page(&self, page: &str) -> bool {
        self.url.as_deref().is_some_and(|url| url.contains(page))
    }
}

/// A window descriptor, optionally populated with its tabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    #[serde(default)]
    pub kind: WindowKind,
    #[serde(default)]
    pub focused: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tabs: Vec<TabInfo>,
}

impl WindowInfo {
    pub fn is_normal(&self) -> bool {
        self.kind == WindowKind::Normal
    }
}

/// Fields that changed in a tab update notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TabChange {
    /// Whether the change alters anything an observer renders.
    pub fn affects_presentation(&self) -> bool {
        self.title.is_some() || self.url.is_some() || self.fav_icon_url.is_some()
    }
}

/// Filter for tab enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl TabQuery {
    /// All tabs of a window.
    pub fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            active: None,
        }
    }

    /// The active tab of a window.
    pub fn active_in(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            active: Some(true),
        }
    }
}

/// Parameters for opening a new browser window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub url: String,
    pub kind: WindowKind,
    pub width: u32,
    pub height: u32,
}
