//! Invariants of the history store and the engine under random event streams.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use tabtrail_core::{
    ordered_view, Engine, EngineConfig, MemoryHost, MemoryStore, WindowHistory,
};
use tabtrail_types::{HostCapabilities, HostEvent, TabId, TabInfo, WindowKind};

#[derive(Debug, Clone)]
enum HistoryOp {
    Remember(TabId),
    Forget(TabId),
    Cursor(usize),
}

fn history_op() -> impl Strategy<Value = HistoryOp> {
    prop_oneof![
        3 => (0..30i64).prop_map(HistoryOp::Remember),
        1 => (0..30i64).prop_map(HistoryOp::Forget),
        1 => (0..12usize).prop_map(HistoryOp::Cursor),
    ]
}

fn live_tab(id: TabId, index: u32) -> TabInfo {
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

fn assert_well_formed(history: &WindowHistory) {
    let unique: HashSet<TabId> = history.entries().iter().copied().collect();
    assert_eq!(unique.len(), history.len(), "duplicate entries: {:?}", history.entries());
    assert!(history.len() <= history.capacity());
    if let Some(cursor) = history.cursor() {
        assert!(cursor < history.len());
    }
}

proptest! {
    #[test]
    fn history_stays_unique_and_bounded(
        capacity in 1..10usize,
        ops in prop::collection::vec(history_op(), 0..200),
    ) {
        let mut history = WindowHistory::new(capacity);
        for op in ops {
            match op {
                HistoryOp::Remember(tab) => {
                    history.remember(tab);
                    prop_assert_eq!(history.front(), Some(tab));
                }
                HistoryOp::Forget(tab) => {
                    history.forget(tab);
                    prop_assert!(!history.contains(tab));
                }
                HistoryOp::Cursor(index) => history.set_cursor(Some(index)),
            }
            assert_well_formed(&history);
        }
    }

    #[test]
    fn forget_keeps_cursor_on_its_entry(
        entries in prop::collection::hash_set(0..40i64, 2..20),
        cursor_seed in any::<prop::sample::Index>(),
        removed_seed in any::<prop::sample::Index>(),
    ) {
        let entries: Vec<TabId> = entries.into_iter().collect();
        let mut history = WindowHistory::from_entries(entries.iter().copied(), 50);
        let cursor = cursor_seed.index(entries.len());
        let removed = removed_seed.index(entries.len());
        history.set_cursor(Some(cursor));
        let under_cursor = entries[cursor];

        history.forget(entries[removed]);
        if removed != cursor {
            prop_assert_eq!(history.cursor().and_then(|c| history.get(c)), Some(under_cursor));
        } else {
            prop_assert_eq!(history.cursor(), Some(cursor.min(history.len() - 1)));
        }
    }

    #[test]
    fn ordered_view_is_a_permutation_of_live_tabs(
        entries in prop::collection::vec(0..30i64, 0..30),
        live in prop::collection::hash_set(0..30i64, 0..20),
    ) {
        let history = WindowHistory::from_entries(entries, 50);
        let live_tabs: Vec<TabInfo> = live
            .iter()
            .enumerate()
            .map(|(index, &id)| live_tab(id, index as u32))
            .collect();

        let view: Vec<TabId> = ordered_view(history.entries(), live_tabs)
            .iter()
            .map(|tab| tab.id)
            .collect();

        let mut sorted = view.clone();
        sorted.sort_unstable();
        let mut expected: Vec<TabId> = live.iter().copied().collect();
        expected.sort_unstable();
        prop_assert_eq!(sorted, expected);

        // Live history entries lead, in history order.
        let tracked: Vec<TabId> = history
            .entries()
            .iter()
            .copied()
            .filter(|id| live.contains(id))
            .collect();
        prop_assert_eq!(&view[..tracked.len()], &tracked[..]);
    }
}

#[derive(Debug, Clone)]
enum UserAction {
    Open,
    Activate(prop::sample::Index),
    Close(prop::sample::Index),
    Back,
    Forward,
    Previous,
}

fn user_action() -> impl Strategy<Value = UserAction> {
    prop_oneof![
        2 => Just(UserAction::Open),
        4 => any::<prop::sample::Index>().prop_map(UserAction::Activate),
        1 => any::<prop::sample::Index>().prop_map(UserAction::Close),
        1 => Just(UserAction::Back),
        1 => Just(UserAction::Forward),
        1 => Just(UserAction::Previous),
    ]
}

async fn pump(engine: &Engine, host: &MemoryHost) {
    loop {
        let events = host.take_events();
        if events.is_empty() {
            break;
        }
        for event in events {
            engine.handle_event(event).await;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_history_tracks_live_tabs(
        capacity in 2..8usize,
        actions in prop::collection::vec(user_action(), 1..60),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let host = Arc::new(MemoryHost::new());
            let store = Arc::new(MemoryStore::new());
            let config = EngineConfig {
                history_capacity: capacity,
                ..EngineConfig::default()
            };
            let engine = Engine::new(config, host.clone(), store);

            let w = host.add_window(WindowKind::Normal);
            let first = host.open_tab(w, "first");
            host.user_activates(first);
            engine
                .handle_event(HostEvent::Hello { capabilities: HostCapabilities::default() })
                .await;
            pump(&engine, &host).await;

            let mut opened = 1;
            for action in actions {
                let tabs = host.tab_ids(w);
                match action {
                    UserAction::Open => {
                        opened += 1;
                        host.open_tab(w, &format!("tab {}", opened));
                    }
                    UserAction::Activate(pick) if !tabs.is_empty() => {
                        host.user_activates(tabs[pick.index(tabs.len())]);
                    }
                    UserAction::Close(pick) if tabs.len() > 1 => {
                        host.user_closes(tabs[pick.index(tabs.len())]);
                    }
                    UserAction::Back => {
                        engine.step(w, 1).await;
                    }
                    UserAction::Forward => {
                        engine.step(w, -1).await;
                    }
                    UserAction::Previous => {
                        engine.switch_to_previous(w).await;
                    }
                    _ => {}
                }
                pump(&engine, &host).await;

                let entries = engine.history(w).await.unwrap_or_default();
                let live: HashSet<TabId> = host.tab_ids(w).into_iter().collect();
                let unique: HashSet<TabId> = entries.iter().copied().collect();
                assert_eq!(unique.len(), entries.len(), "duplicates in {:?}", entries);
                assert!(entries.len() <= capacity);
                assert!(entries.iter().all(|id| live.contains(id)), "stale entry in {:?}", entries);

                let snapshot = engine.snapshot(w).await.unwrap();
                let shown: HashSet<TabId> = snapshot.iter().map(|t| t.id).collect();
                assert_eq!(shown.len(), snapshot.len());
                assert_eq!(shown, live);
            }
        });
    }
}
