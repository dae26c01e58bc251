//! User-facing commands and host capabilities.

use serde::{Deserialize, Serialize};

/// Commands bound to keyboard shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    /// Walk one step towards older tabs.
    #[serde(rename = "tab-history-back")]
    StepBack,
    /// Walk one step towards more recent tabs.
    #[serde(rename = "tab-history-forward")]
    StepForward,
    /// Open (or focus) the tab manager window.
    #[serde(rename = "open-tab-manager")]
    OpenTabManager,
}

impl UserCommand {
    /// History delta for walk commands: back moves towards older entries.
    pub fn delta(self) -> Option<isize> {
        match self {
            UserCommand::StepBack => Some(1),
            UserCommand::StepForward => Some(-1),
            UserCommand::OpenTabManager => None,
        }
    }
}

/// Optional browser features, announced once by the extension shim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// The browser exposes a context-menu API for the toolbar action.
    #[serde(default)]
    pub context_menus: bool,
    /// The browser fires an event right before showing the menu, so it can be
    /// rebuilt lazily instead of after every change.
    #[serde(default)]
    pub menu_shown_event: bool,
}

impl HostCapabilities {
    /// Menus must be rebuilt eagerly when they exist but have no "shown" hook.
    pub fn eager_menu_rebuild(&self) -> bool {
        self.context_menus && !self.menu_shown_event
    }
}
