//! Per-window most-recently-used tab history.
//!
//! Each window keeps its tab identifiers most-recent-first, without duplicates
//! and bounded by a capacity. A cursor marks the position of an explicit
//! back/forward walk; it is cleared when the user is not walking.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tabtrail_types::{TabId, TabInfo, WindowId};
use tracing::{debug, trace};

/// Default number of entries kept per window.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// History of a single window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHistory {
    /// Most recent first.
    entries: Vec<TabId>,
    cursor: Option<usize>,
    /// Tab last observed active in this window.
    active: Option<TabId>,
    capacity: usize,
}

impl WindowHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            active: None,
            capacity: capacity.max(1),
        }
    }

    /// Build from a persisted or seeded sequence, dropping duplicates and
    /// anything past capacity.
    pub fn from_entries(entries: impl IntoIterator<Item = TabId>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        let mut seen = HashSet::new();
        for tab_id in entries {
            if history.entries.len() == history.capacity {
                break;
            }
            if seen.insert(tab_id) {
                history.entries.push(tab_id);
            }
        }
        history
    }

    pub fn entries(&self) -> &[TabId] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn front(&self) -> Option<TabId> {
        self.entries.first().copied()
    }

    pub fn get(&self, index: usize) -> Option<TabId> {
        self.entries.get(index).copied()
    }

    pub fn position(&self, tab_id: TabId) -> Option<usize> {
        self.entries.iter().position(|&id| id == tab_id)
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.entries.contains(&tab_id)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Set the cursor; out-of-range positions clear it.
    pub fn set_cursor(&mut self, cursor: Option<usize>) {
        self.cursor = cursor.filter(|&i| i < self.entries.len());
    }

    /// Point the cursor at `tab_id`, or at the front when it is not tracked.
    pub fn point_at(&mut self, tab_id: TabId) -> Option<usize> {
        let index = self.position(tab_id).unwrap_or(0);
        self.set_cursor(Some(index));
        self.cursor
    }

    pub fn active(&self) -> Option<TabId> {
        self.active
    }

    pub fn set_active(&mut self, tab_id: Option<TabId>) {
        self.active = tab_id;
    }

    /// Move `tab_id` to the front, inserting it if absent. Returns the entry
    /// evicted to stay within capacity.
    pub fn remember(&mut self, tab_id: TabId) -> Option<TabId> {
        if let Some(existing) = self.position(tab_id) {
            self.entries.remove(existing);
        }
        self.entries.insert(0, tab_id);

        let evicted = if self.entries.len() > self.capacity {
            self.entries.pop()
        } else {
            None
        };
        // Keep the cursor a valid index.
        self.set_cursor(self.cursor);
        evicted
    }

    /// Remove `tab_id`, returning the index it occupied. The cursor follows
    /// the entry it pointed at; removing the entry under the cursor keeps the
    /// cursor in place, clamped to the new length.
    pub fn forget(&mut self, tab_id: TabId) -> Option<usize> {
        let removed = self.position(tab_id)?;
        self.entries.remove(removed);
        self.adjust_cursor_on_removal(removed);
        if self.active == Some(tab_id) {
            self.active = None;
        }
        Some(removed)
    }

    /// Drop every entry not in `live`. Returns the dropped identifiers.
    pub fn retain_live(&mut self, live: &HashSet<TabId>) -> Vec<TabId> {
        let dead: Vec<TabId> = self
            .entries
            .iter()
            .copied()
            .filter(|id| !live.contains(id))
            .collect();
        for &tab_id in &dead {
            self.forget(tab_id);
        }
        dead
    }

    fn adjust_cursor_on_removal(&mut self, removed: usize) {
        let Some(cursor) = self.cursor else {
            return;
        };
        if self.entries.is_empty() {
            self.cursor = None;
            return;
        }
        let next = if removed < cursor {
            cursor - 1
        } else if removed == cursor {
            cursor.min(self.entries.len() - 1)
        } else {
            cursor
        };
        self.cursor = Some(next);
    }

    /// Persisted representation: the ordered identifiers.
    pub fn to_value(&self) -> Value {
        Value::from(self.entries.clone())
    }
}

/// Outcome of [`HistoryStore::remember`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remembered {
    /// Entry dropped from the back to respect capacity.
    pub evicted: Option<TabId>,
    /// Other windows the tab was removed from.
    pub moved_from: Vec<WindowId>,
}

/// Histories of all live windows.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    windows: HashMap<WindowId, WindowHistory>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, window_id: WindowId) -> bool {
        self.windows.contains_key(&window_id)
    }

    pub fn get(&self, window_id: WindowId) -> Option<&WindowHistory> {
        self.windows.get(&window_id)
    }

    pub fn get_mut(&mut self, window_id: WindowId) -> Option<&mut WindowHistory> {
        self.windows.get_mut(&window_id)
    }

    /// History of `window_id`, created empty on first use.
    pub fn window_mut(&mut self, window_id: WindowId) -> &mut WindowHistory {
        let capacity = self.capacity;
        self.windows
            .entry(window_id)
            .or_insert_with(|| WindowHistory::new(capacity))
    }

    /// Build a window's history from an ordered sequence, replacing any
    /// existing record but keeping its active tab.
    pub fn replace(&mut self, window_id: WindowId, entries: impl IntoIterator<Item = TabId>) {
        let mut history = WindowHistory::from_entries(entries, self.capacity);
        if let Some(previous) = self.windows.get(&window_id) {
            history.set_active(previous.active());
        }
        self.windows.insert(window_id, history);
    }

    pub fn remove(&mut self, window_id: WindowId) -> Option<WindowHistory> {
        self.windows.remove(&window_id)
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.windows.keys().copied().collect()
    }

    /// Window whose history holds `tab_id`.
    pub fn owner_of(&self, tab_id: TabId) -> Option<WindowId> {
        self.windows
            .iter()
            .find(|(_, history)| history.contains(tab_id))
            .map(|(&window_id, _)| window_id)
    }

    /// Move `tab_id` to the front of `window_id`, removing it from any other
    /// window first so a tab is tracked by one window at a time.
    pub fn remember(&mut self, window_id: WindowId, tab_id: TabId) -> Remembered {
        let mut moved_from = Vec::new();
        for (&other_id, other) in self.windows.iter_mut() {
            if other_id != window_id && other.forget(tab_id).is_some() {
                moved_from.push(other_id);
            }
        }
        if !moved_from.is_empty() {
            debug!(target: "tabtrail::history", "Tab {} moved to window {} from {:?}", tab_id, window_id, moved_from);
        }

        let evicted = self.window_mut(window_id).remember(tab_id);
        if let Some(evicted) = evicted {
            trace!(target: "tabtrail::history", "Evicted tab {} from window {}", evicted, window_id);
        }
        Remembered {
            evicted,
            moved_from,
        }
    }

    /// Remove `tab_id` from `window_id`, returning its former index.
    pub fn forget(&mut self, window_id: WindowId, tab_id: TabId) -> Option<usize> {
        self.windows.get_mut(&window_id)?.forget(tab_id)
    }
}

/// History entries that are still live, followed by live tabs the history
/// does not know about in tab-strip order. Every live tab appears exactly once.
pub fn ordered_view(entries: &[TabId], live: Vec<TabInfo>) -> Vec<TabInfo> {
    let mut by_id: HashMap<TabId, TabInfo> = live.into_iter().map(|tab| (tab.id, tab)).collect();

    let mut ordered = Vec::with_capacity(by_id.len());
    for tab_id in entries {
        if let Some(tab) = by_id.remove(tab_id) {
            ordered.push(tab);
        }
    }

    let mut remaining: Vec<TabInfo> = by_id.into_values().collect();
    remaining.sort_by_key(|tab| (tab.index, tab.id));
    ordered.extend(remaining);
    ordered
}

/// Initial history for a window derived from its tabs: most recently accessed
/// first when the browser reports access times, otherwise tab-strip order with
/// the active tab moved to the front.
pub fn seed_order(tabs: &[TabInfo]) -> Vec<TabId> {
    let mut ordered: Vec<&TabInfo> = tabs.iter().collect();
    let has_access_times = tabs
        .iter()
        .any(|tab| tab.last_accessed.is_some_and(|t| t > 0.0));

    if has_access_times {
        ordered.sort_by(|a, b| {
            let a_accessed = a.last_accessed.unwrap_or(0.0);
            let b_accessed = b.last_accessed.unwrap_or(0.0);
            b_accessed
                .total_cmp(&a_accessed)
                .then(a.index.cmp(&b.index))
        });
    } else {
        ordered.sort_by_key(|tab| tab.index);
        if let Some(active) = ordered.iter().position(|tab| tab.active) {
            let tab = ordered.remove(active);
            ordered.insert(0, tab);
        }
    }
    ordered.into_iter().map(|tab| tab.id).collect()
}

/// Rebuild a window's history from a fresh enumeration of its tabs: known
/// entries that are still live keep their order, the rest follow in seed order.
pub fn rederive(existing: &[TabId], tabs: &[TabInfo]) -> Vec<TabId> {
    let live: HashSet<TabId> = tabs.iter().map(|tab| tab.id).collect();
    let mut entries: Vec<TabId> = existing
        .iter()
        .copied()
        .filter(|id| live.contains(id))
        .collect();
    let known: HashSet<TabId> = entries.iter().copied().collect();
    entries.extend(seed_order(tabs).into_iter().filter(|id| !known.contains(id)));
    entries
}

/// Parse a persisted history value. Anything but an array of identifiers is
/// treated as absent.
pub fn decode_entries(value: Value) -> Option<Vec<TabId>> {
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(entries: &[TabId]) -> WindowHistory {
        WindowHistory::from_entries(entries.iter().copied(), DEFAULT_HISTORY_CAPACITY)
    }

    fn live_tab(id: TabId, index: u32) -> TabInfo {
        TabInfo {
            id,
            window_id: 1,
            index,
            title: Some(format!("Tab {}", id)),
            url: None,
            pending_url: None,
            fav_icon_url: None,
            active: false,
            last_accessed: None,
        }
    }

    #[test]
    fn test_remember_moves_existing_to_front() {
        let mut h = history(&[1, 2, 3]);
        h.remember(3);
        assert_eq!(h.entries(), &[3, 1, 2]);
        h.remember(4);
        assert_eq!(h.entries(), &[4, 3, 1, 2]);
    }

    #[test]
    fn test_activation_sequence_scenario() {
        // Tabs 1,2,3 activated in order 1 -> 2 -> 3 -> 2.
        let mut h = WindowHistory::new(DEFAULT_HISTORY_CAPACITY);
        for tab in [1, 2, 3, 2] {
            h.remember(tab);
        }
        assert_eq!(h.entries(), &[2, 3, 1]);
    }

    #[test]
    fn test_remember_evicts_oldest_past_capacity() {
        let mut h = WindowHistory::new(3);
        for tab in 1..=3 {
            assert_eq!(h.remember(tab), None);
        }
        assert_eq!(h.remember(4), Some(1));
        assert_eq!(h.entries(), &[4, 3, 2]);
        // Re-activating an existing entry never evicts.
        assert_eq!(h.remember(2), None);
        assert_eq!(h.entries(), &[2, 4, 3]);
    }

    #[test]
    fn test_from_entries_dedups_and_truncates() {
        let h = WindowHistory::from_entries([5, 6, 5, 7, 8], 3);
        assert_eq!(h.entries(), &[5, 6, 7]);
    }

    #[test]
    fn test_forget_before_cursor_decrements() {
        let mut h = history(&[1, 2, 3, 4]);
        h.set_cursor(Some(2));
        assert_eq!(h.forget(1), Some(0));
        assert_eq!(h.cursor(), Some(1));
        assert_eq!(h.get(1), Some(3));
    }

    #[test]
    fn test_forget_at_cursor_clamps() {
        let mut h = history(&[1, 2, 3]);
        h.set_cursor(Some(1));
        assert_eq!(h.forget(2), Some(1));
        assert_eq!(h.cursor(), Some(1));

        let mut h = history(&[1, 2, 3]);
        h.set_cursor(Some(2));
        assert_eq!(h.forget(3), Some(2));
        assert_eq!(h.cursor(), Some(1));
    }

    #[test]
    fn test_forget_after_cursor_keeps_it() {
        let mut h = history(&[1, 2, 3]);
        h.set_cursor(Some(0));
        h.forget(3);
        assert_eq!(h.cursor(), Some(0));
    }

    #[test]
    fn test_forget_last_entry_clears_cursor() {
        let mut h = history(&[1]);
        h.set_cursor(Some(0));
        assert_eq!(h.forget(1), Some(0));
        assert_eq!(h.cursor(), None);
        assert!(h.is_empty());
    }

    #[test]
    fn test_forget_unknown_is_noop() {
        let mut h = history(&[1, 2]);
        h.set_cursor(Some(1));
        assert_eq!(h.forget(9), None);
        assert_eq!(h.entries(), &[1, 2]);
        assert_eq!(h.cursor(), Some(1));
    }

    #[test]
    fn test_forget_clears_active_record() {
        let mut h = history(&[1, 2]);
        h.set_active(Some(1));
        h.forget(1);
        assert_eq!(h.active(), None);
    }

    #[test]
    fn test_point_at_untracked_goes_to_front() {
        let mut h = history(&[1, 2, 3]);
        assert_eq!(h.point_at(3), Some(2));
        assert_eq!(h.point_at(42), Some(0));

        let mut empty = WindowHistory::new(5);
        assert_eq!(empty.point_at(1), None);
    }

    #[test]
    fn test_retain_live_drops_dead_tabs() {
        let mut h = history(&[1, 2, 3, 4]);
        h.set_cursor(Some(3));
        let live: HashSet<TabId> = [1, 4].into_iter().collect();
        let mut dropped = h.retain_live(&live);
        dropped.sort();
        assert_eq!(dropped, vec![2, 3]);
        assert_eq!(h.entries(), &[1, 4]);
        assert_eq!(h.cursor(), Some(1));
    }

    #[test]
    fn test_store_remember_keeps_tab_in_one_window() {
        let mut store = HistoryStore::new(DEFAULT_HISTORY_CAPACITY);
        store.remember(1, 10);
        store.remember(1, 11);
        let outcome = store.remember(2, 10);
        assert_eq!(outcome.moved_from, vec![1]);
        assert_eq!(store.get(1).unwrap().entries(), &[11]);
        assert_eq!(store.get(2).unwrap().entries(), &[10]);
        assert_eq!(store.owner_of(10), Some(2));
    }

    #[test]
    fn test_store_replace_keeps_active() {
        let mut store = HistoryStore::new(10);
        store.window_mut(1).set_active(Some(3));
        store.replace(1, [3, 2, 1]);
        let h = store.get(1).unwrap();
        assert_eq!(h.entries(), &[3, 2, 1]);
        assert_eq!(h.active(), Some(3));
    }

    #[test]
    fn test_ordered_view_history_then_strip_order() {
        let live = vec![live_tab(1, 0), live_tab(2, 1), live_tab(3, 2), live_tab(4, 3)];
        // 9 is stale, 1 and 4 are unknown to history.
        let view = ordered_view(&[3, 9, 2], live);
        let ids: Vec<TabId> = view.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_ordered_view_empty_history_is_strip_order() {
        let live = vec![live_tab(7, 2), live_tab(5, 0), live_tab(6, 1)];
        let ids: Vec<TabId> = ordered_view(&[], live).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_seed_order_by_last_accessed() {
        let mut a = live_tab(1, 0);
        a.last_accessed = Some(100.0);
        let mut b = live_tab(2, 1);
        b.last_accessed = Some(300.0);
        let c = live_tab(3, 2);
        assert_eq!(seed_order(&[a, b, c]), vec![2, 1, 3]);
    }

    #[test]
    fn test_seed_order_without_access_times_puts_active_first() {
        let a = live_tab(1, 0);
        let mut b = live_tab(2, 2);
        b.active = true;
        let c = live_tab(3, 1);
        assert_eq!(seed_order(&[a, b, c]), vec![2, 1, 3]);
    }

    #[test]
    fn test_rederive_keeps_known_order() {
        let mut active = live_tab(3, 2);
        active.active = true;
        let tabs = vec![live_tab(1, 0), live_tab(2, 1), active, live_tab(4, 3)];
        // 9 is gone; 3 and 4 are new, 3 is active.
        assert_eq!(rederive(&[2, 9, 1], &tabs), vec![2, 1, 3, 4]);
        assert_eq!(rederive(&[], &tabs), vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_decode_entries() {
        assert_eq!(decode_entries(serde_json::json!([3, 1, 2])), Some(vec![3, 1, 2]));
        assert_eq!(decode_entries(serde_json::json!({"bad": true})), None);
        assert_eq!(decode_entries(Value::Null), None);
    }

    #[test]
    fn test_to_value_round_trip() {
        let h = history(&[4, 2]);
        assert_eq!(decode_entries(h.to_value()), Some(vec![4, 2]));
    }
}
