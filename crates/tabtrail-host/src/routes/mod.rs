//! HTTP route handlers.

pub mod history;
pub mod ws;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Observer feed: `/api` for snapshots, `/ws` for live updates.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/windows/{id}/history", get(history::get))
        .route("/health", get(health));

    let ws_routes = Router::new().route("/windows/{id}", get(ws::upgrade));

    Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
