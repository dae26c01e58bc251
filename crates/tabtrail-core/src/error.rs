//! Error types for tabtrail.

use tabtrail_types::{TabId, WindowId};
use thiserror::Error;

/// Failures crossing the browser boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Tab not found: {0}")]
    TabNotFound(TabId),

    #[error("Window not found: {0}")]
    WindowNotFound(WindowId),

    #[error("Host call {op} failed: {message}")]
    CallFailed { op: String, message: String },

    #[error("Host call {0} timed out")]
    Timeout(String),

    #[error("Host bridge disconnected")]
    Disconnected,

    #[error("Unexpected host reply to {op}: {message}")]
    Protocol { op: String, message: String },
}

impl HostError {
    /// The referenced tab or window no longer exists.
    pub fn is_stale(&self) -> bool {
        matches!(self, HostError::TabNotFound(_) | HostError::WindowNotFound(_))
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
