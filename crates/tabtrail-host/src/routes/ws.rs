//! WebSocket route handler.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use tabtrail_types::WindowId;

use crate::state::AppState;
use crate::websocket::handle_websocket;

pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Path(window_id): Path<WindowId>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, window_id))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, window_id: WindowId) {
    if let Err(e) = handle_websocket(socket, state, window_id).await {
        tracing::error!(target: "tabtrail::http", "WebSocket error for window {}: {}", window_id, e);
    }
}
