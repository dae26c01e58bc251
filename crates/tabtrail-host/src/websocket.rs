//! WebSocket observers of one window's history.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tabtrail_types::{MessageSender, ObserverPush, ObserverRequest, WindowId};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::state::AppState;

/// Maximum size of an inbound request frame.
const MAX_REQUEST_SIZE: usize = 4 * 1024;

pub async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, window_id: WindowId) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut push_rx = state.engine.subscribe();

    // Responses produced by recv_task, written by send_task.
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(32);

    info!(target: "tabtrail::http", "Observer connected to window {}", window_id);

    let mut send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                Some(json) = outgoing_rx.recv() => json,
                received = push_rx.recv() => match received {
                    Ok(push) if push.window_id() == window_id => match to_json(&push) {
                        Some(json) => json,
                        None => continue,
                    },
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(target: "tabtrail::http", "Observer lagged by {} updates", skipped);
                        match to_json(&ObserverPush::HistoryUpdated { window_id }) {
                            Some(json) => json,
                            None => continue,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                else => break,
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                debug!(target: "tabtrail::http", "Observer of window {} went away", window_id);
                break;
            }
        }
    });

    let observers = state.observers.clone();
    let mut recv_task = tokio::spawn(async move {
        let sender = MessageSender {
            tab_id: None,
            window_id: Some(window_id),
        };
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    if text.as_str().len() > MAX_REQUEST_SIZE {
                        warn!(target: "tabtrail::http", "Dropping {} byte observer request", text.as_str().len());
                        continue;
                    }
                    let request: ObserverRequest = match serde_json::from_str(text.as_str()) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(target: "tabtrail::http", "Bad observer request: {}", e);
                            continue;
                        }
                    };
                    let Some(response) = observers.request(sender, request).await else {
                        debug!(target: "tabtrail::http", "Event loop stopped, closing observer of window {}", window_id);
                        break;
                    };
                    let Some(json) = to_json(&response) else {
                        continue;
                    };
                    if outgoing_tx.send(json).await.is_err() {
                        break;
                    }
                }
                Message::Ping(_) => {
                    trace!(target: "tabtrail::http", "Ping from observer of window {}", window_id);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    info!(target: "tabtrail::http", "Observer of window {} disconnected", window_id);
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(target: "tabtrail::http", "Failed to encode observer frame: {}", e);
            None
        }
    }
}
