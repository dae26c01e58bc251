//! Classifies raw tab activations as user-driven or engine-driven.
//!
//! Before the engine activates a tab itself it arms a suppression for that
//! window. The next activation observed in the window consumes it and only
//! moves the cursor; every other activation is remembered at the front.

use std::collections::HashMap;

use tabtrail_types::{TabId, WindowId};
use tracing::{debug, warn};

use crate::store::HistoryStore;

/// Per-window reconciliation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcileState {
    #[default]
    Normal,
    /// The next activation was requested by the engine for this tab.
    Suppressing(TabId),
}

/// How an activation was applied to the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// User-driven: the tab moved to the front, leaving `moved_from` if it
    /// was tracked by another window.
    Remembered { moved_from: Vec<WindowId> },
    /// Engine-driven: order untouched, cursor moved to the tab.
    Consumed { expected: TabId },
}

impl Activation {
    /// Whether the history order or membership changed.
    pub fn reordered(&self) -> bool {
        matches!(self, Activation::Remembered { .. })
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    states: HashMap<WindowId, ReconcileState>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, window_id: WindowId) -> ReconcileState {
        self.states.get(&window_id).copied().unwrap_or_default()
    }

    /// Expect the next activation in `window_id` to be `tab_id`. A second arm
    /// before the event arrives replaces the first.
    pub fn arm(&mut self, window_id: WindowId, tab_id: TabId) {
        if let Some(ReconcileState::Suppressing(previous)) = self
            .states
            .insert(window_id, ReconcileState::Suppressing(tab_id))
        {
            debug!(target: "tabtrail::reconcile", "Window {} suppression {} replaced by {}", window_id, previous, tab_id);
        }
    }

    /// Drop a pending suppression, e.g. when the activation request failed.
    pub fn disarm(&mut self, window_id: WindowId) {
        self.states.remove(&window_id);
    }

    /// Apply a raw activation event to the window's history.
    pub fn on_activated(
        &mut self,
        history: &mut HistoryStore,
        window_id: WindowId,
        tab_id: TabId,
    ) -> Activation {
        match self.states.remove(&window_id) {
            Some(ReconcileState::Suppressing(expected)) => {
                if expected != tab_id {
                    warn!(
                        target: "tabtrail::reconcile",
                        "Window {} expected activation of tab {} but saw {}",
                        window_id, expected, tab_id
                    );
                }
                let window = history.window_mut(window_id);
                window.point_at(tab_id);
                window.set_active(Some(tab_id));
                Activation::Consumed { expected }
            }
            Some(ReconcileState::Normal) | None => {
                let remembered = history.remember(window_id, tab_id);
                let window = history.window_mut(window_id);
                window.set_cursor(Some(0));
                window.set_active(Some(tab_id));
                Activation::Remembered {
                    moved_from: remembered.moved_from,
                }
            }
        }
    }
}
