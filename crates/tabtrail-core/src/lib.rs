//! Most-recently-used tab history engine for tabtrail.

mod engine;
mod error;
mod events;
mod feed;
mod host;
mod managers;
mod memory;
mod menu;
mod navigation;
mod reconciler;
mod store;

pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, HostError};
pub use events::fallback_order;
pub use feed::{snapshot_entries, PresentationFeed};
pub use host::{active_tab, history_key, KvStore, TabHost};
pub use managers::ManagerRegistry;
pub use memory::{MemoryHost, MemoryStore, MenuOp};
pub use menu::{
    build_menu, parse_menu_item, tab_item_id, truncate_title, MenuAction, MenuBuilder,
    ACTIVE_MARKER, MENU_ROOT_ID, OPEN_MANAGER_ID,
};
pub use navigation::{plan_repaired_step, plan_step, previous_candidates, step_from, StepPlan};
pub use reconciler::{Activation, ReconcileState, Reconciler};
pub use store::{
    decode_entries, ordered_view, rederive, seed_order, HistoryStore, Remembered, WindowHistory,
    DEFAULT_HISTORY_CAPACITY,
};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
