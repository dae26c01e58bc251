//! Back/forward walks, swap-to-previous and order-preserving activation.
//!
//! Every activation the engine requests is attempted against an explicit list
//! of candidates. A candidate the browser no longer knows is forgotten and the
//! next one is tried. A step whose candidates all turn out stale rebuilds the
//! history from the live tabs once and retries.

use tabtrail_types::{TabId, WindowId};
use tracing::{debug, info, trace, warn};

use crate::host::active_tab;
use crate::store::WindowHistory;
use crate::Engine;

/// Where a back/forward step lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPlan {
    /// Activate `tab_id` at `index`, walking from `anchor`.
    Target {
        anchor: usize,
        index: usize,
        tab_id: TabId,
    },
    /// The step would leave the history.
    OutOfRange,
    /// The history is empty or does not track the active tab.
    Untracked,
}

/// Plan a step of `delta` entries (positive walks towards older tabs). The
/// walk starts from the cursor while it still points at the active tab,
/// otherwise from the active tab's position.
pub fn plan_step(history: &WindowHistory, active: Option<TabId>, delta: isize) -> StepPlan {
    if history.is_empty() {
        return StepPlan::Untracked;
    }
    let anchor = match history.cursor() {
        Some(cursor) if active.is_some() && history.get(cursor) == active => cursor,
        _ => match active.and_then(|tab_id| history.position(tab_id)) {
            Some(index) => index,
            None => return StepPlan::Untracked,
        },
    };
    step_from(history, anchor, delta)
}

/// Plan a step of `delta` entries from a known anchor.
pub fn step_from(history: &WindowHistory, anchor: usize, delta: isize) -> StepPlan {
    let Some(index) = anchor.checked_add_signed(delta) else {
        return StepPlan::OutOfRange;
    };
    match history.get(index) {
        Some(tab_id) => StepPlan::Target {
            anchor,
            index,
            tab_id,
        },
        None => StepPlan::OutOfRange,
    }
}

/// Plan a step over a freshly repaired history. When the active tab is still
/// unknown the walk starts from the front.
pub fn plan_repaired_step(history: &WindowHistory, active: Option<TabId>, delta: isize) -> StepPlan {
    match plan_step(history, active, delta) {
        StepPlan::Untracked if !history.is_empty() => step_from(history, 0, delta),
        other => other,
    }
}

/// Candidates for swap-to-previous: everything behind the front entry.
pub fn previous_candidates(history: &WindowHistory) -> Vec<TabId> {
    history.entries().iter().skip(1).copied().collect()
}

/// Outcome of a single activation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    Activated,
    /// The tab is gone; it has been forgotten.
    Stale,
    /// The host failed for another reason.
    Failed,
}

impl Engine {
    /// Swap the two most recent tabs of `window_id`: the second most recent
    /// tab becomes active and moves to the front. Stale candidates are skipped.
    pub async fn switch_to_previous(&self, window_id: WindowId) -> Option<TabId> {
        self.ensure_loaded(window_id).await;

        let mut candidates = self.with_history(window_id, previous_candidates).await;
        if candidates.is_empty() && self.repair(window_id).await {
            candidates = self.with_history(window_id, previous_candidates).await;
        }
        if candidates.is_empty() {
            debug!(target: "tabtrail::nav", "No previous tab in window {}", window_id);
            return None;
        }

        for tab_id in candidates {
            match self.try_activate(window_id, tab_id, true).await {
                Attempt::Activated => {
                    {
                        let mut state = self.state.lock().await;
                        if !state.history.contains(window_id) {
                            return Some(tab_id);
                        }
                        state.history.remember(window_id, tab_id);
                        let history = state.history.window_mut(window_id);
                        history.set_cursor(Some(0));
                        history.set_active(Some(tab_id));
                    }
                    self.persist(window_id).await;
                    info!(target: "tabtrail::nav", "Window {} switched to previous tab {}", window_id, tab_id);
                    return Some(tab_id);
                }
                Attempt::Stale => continue,
                Attempt::Failed => return None,
            }
        }
        None
    }

    /// Walk `delta` entries through the history without reordering it.
    /// Positive deltas move towards older tabs.
    pub async fn step(&self, window_id: WindowId, delta: isize) -> Option<TabId> {
        self.ensure_loaded(window_id).await;

        let active = match active_tab(self.host.as_ref(), window_id).await {
            Ok(active) => active,
            Err(e) => {
                warn!(target: "tabtrail::nav", "Failed to resolve active tab of window {}: {}", window_id, e);
                None
            }
        };

        let mut plan = self
            .with_history(window_id, |h| plan_step(h, active, delta))
            .await;
        let untracked = plan == StepPlan::Untracked;
        if untracked {
            self.repair(window_id).await;
            plan = self
                .with_history(window_id, |h| plan_repaired_step(h, active, delta))
                .await;
        }

        let mut repaired = untracked;
        let mut skipped = false;
        loop {
            let StepPlan::Target {
                anchor,
                index,
                tab_id,
            } = plan
            else {
                if skipped && !repaired {
                    // Stale entries ran out: rebuild from the live tabs once.
                    repaired = true;
                    self.repair(window_id).await;
                    plan = self
                        .with_history(window_id, |h| plan_repaired_step(h, active, delta))
                        .await;
                    continue;
                }
                debug!(target: "tabtrail::nav", "Step {} in window {} has no target", delta, window_id);
                return None;
            };

            self.set_cursor(window_id, Some(index)).await;
            match self.try_activate(window_id, tab_id, true).await {
                Attempt::Activated => {
                    debug!(target: "tabtrail::nav", "Window {} stepped {} to tab {} at {}", window_id, delta, tab_id, index);
                    return Some(tab_id);
                }
                Attempt::Failed => {
                    self.set_cursor(window_id, Some(anchor)).await;
                    return None;
                }
                Attempt::Stale => {
                    skipped = true;
                    // The stale entry is gone; entries behind it shifted up.
                    let anchor = if index < anchor { anchor - 1 } else { anchor };
                    plan = self
                        .with_history(window_id, |h| step_from(h, anchor, delta))
                        .await;
                }
            }
        }
    }

    /// Activate a tab picked from a list without moving it to the front.
    /// When it turns out to be gone, the entries below it are tried in turn.
    pub async fn activate_preserving_order(&self, tab_id: TabId) -> Option<TabId> {
        let tab = match self.host.get_tab(tab_id).await {
            Ok(tab) => tab,
            Err(e) => {
                debug!(target: "tabtrail::nav", "Cannot activate tab {}: {}", tab_id, e);
                return None;
            }
        };
        let window_id = tab.window_id;
        self.ensure_loaded(window_id).await;

        let candidates = self
            .with_history(window_id, |h| match h.position(tab_id) {
                Some(index) => h.entries()[index..].to_vec(),
                None => vec![tab_id],
            })
            .await;

        for candidate in candidates {
            {
                let mut state = self.state.lock().await;
                match state.history.get_mut(window_id) {
                    Some(history) => {
                        history.point_at(candidate);
                    }
                    None => return None,
                }
            }
            match self.try_activate(window_id, candidate, true).await {
                Attempt::Activated => return Some(candidate),
                Attempt::Stale => continue,
                Attempt::Failed => return None,
            }
        }
        None
    }

    /// Activate the first candidate that still exists.
    pub(crate) async fn activate_first_available(
        &self,
        window_id: WindowId,
        candidates: Vec<TabId>,
        suppress: bool,
    ) -> Option<TabId> {
        for tab_id in candidates {
            match self.try_activate(window_id, tab_id, suppress).await {
                Attempt::Activated => return Some(tab_id),
                Attempt::Stale => continue,
                Attempt::Failed => return None,
            }
        }
        debug!(target: "tabtrail::nav", "No tab left to activate in window {}", window_id);
        None
    }

    /// Request activation of `tab_id`, arming a suppression first when the
    /// resulting event must not reorder the history.
    pub(crate) async fn try_activate(
        &self,
        window_id: WindowId,
        tab_id: TabId,
        suppress: bool,
    ) -> Attempt {
        if suppress {
            // The browser reports no activation for a tab that is already
            // active, so nothing would consume the suppression.
            if self.is_active(window_id, tab_id).await {
                debug!(target: "tabtrail::nav", "Tab {} is already active in window {}", tab_id, window_id);
                return Attempt::Activated;
            }
            self.state.lock().await.reconciler.arm(window_id, tab_id);
        }

        match self.host.activate_tab(tab_id).await {
            Ok(()) => Attempt::Activated,
            Err(e) if e.is_stale() => {
                let forgotten = {
                    let mut state = self.state.lock().await;
                    if suppress {
                        state.reconciler.disarm(window_id);
                    }
                    state.history.forget(window_id, tab_id).is_some()
                };
                debug!(target: "tabtrail::nav", "Skipping stale tab {} in window {}", tab_id, window_id);
                if forgotten {
                    self.persist(window_id).await;
                }
                Attempt::Stale
            }
            Err(e) => {
                if suppress {
                    self.state.lock().await.reconciler.disarm(window_id);
                }
                warn!(target: "tabtrail::nav", "Failed to activate tab {} in window {}: {}", tab_id, window_id, e);
                Attempt::Failed
            }
        }
    }

    async fn is_active(&self, window_id: WindowId, tab_id: TabId) -> bool {
        match active_tab(self.host.as_ref(), window_id).await {
            Ok(active) => active == Some(tab_id),
            Err(e) => {
                trace!(target: "tabtrail::nav", "Cannot resolve active tab of window {}: {}", window_id, e);
                false
            }
        }
    }

    async fn set_cursor(&self, window_id: WindowId, cursor: Option<usize>) {
        if let Some(history) = self.state.lock().await.history.get_mut(window_id) {
            history.set_cursor(cursor);
        }
    }
}
