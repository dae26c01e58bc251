//! Window history snapshots.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tabtrail_core::HostError;
use tabtrail_types::{TabEntry, WindowId};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HistoryResponse {
    pub tabs: Vec<TabEntry>,
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(window_id): Path<WindowId>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let tabs = state.engine.snapshot(window_id).await.map_err(|e| match e {
        HostError::WindowNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        HostError::Timeout(_) | HostError::Disconnected => {
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    })?;

    Ok(Json(HistoryResponse { tabs }))
}
