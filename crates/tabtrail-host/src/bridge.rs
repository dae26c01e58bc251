//! Request/reply correlation over the native messaging pipe.
//!
//! One reader task decodes frames from the shim: replies resolve pending calls,
//! events and relayed messages go to the inbound channel. One writer task owns
//! the output stream so frames never interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tabtrail_core::{HostError, KvStore, TabHost};
use tabtrail_types::{
    reply_result, BridgeFrame, CallFailure, HostCall, HostEvent, MenuItem, MessageSender,
    ObserverPush, ObserverRequest, ObserverResponse, TabId, TabInfo, TabQuery, WindowId,
    WindowInfo, WindowSpec,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::codec::{read_frame, write_frame, BridgeError};

type PendingReply = oneshot::Sender<Result<Value, CallFailure>>;

/// Work for the engine arriving from the shim.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(HostEvent),
    Message {
        id: u64,
        sender: MessageSender,
        body: ObserverRequest,
    },
}

pub struct Bridge {
    outbound: mpsc::UnboundedSender<BridgeFrame>,
    pending: DashMap<u64, PendingReply>,
    next_id: AtomicU64,
    call_timeout: Duration,
    closed: AtomicBool,
}

impl Bridge {
    /// Start the reader and writer tasks. The returned receiver yields inbound
    /// work until the shim closes its end.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        call_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Inbound>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let bridge = Arc::new(Self {
            outbound: outbound_tx,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            call_timeout,
            closed: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(writer, outbound_rx));
        tokio::spawn(read_loop(reader, bridge.clone(), inbound_tx));

        (bridge, inbound_rx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Fail every outstanding call and refuse new ones.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the senders wakes every waiter with Disconnected.
        self.pending.clear();
        info!(target: "tabtrail::bridge", "Bridge closed");
    }

    /// Answer a relayed observer message.
    pub fn respond(&self, id: u64, body: ObserverResponse) {
        if self.outbound.send(BridgeFrame::Respond { id, body }).is_err() {
            debug!(target: "tabtrail::bridge", "Dropped response {}: writer gone", id);
        }
    }

    /// Issue a call and wait for its reply.
    pub async fn call(&self, call: HostCall) -> Result<Value, HostError> {
        if self.is_closed() {
            return Err(HostError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let op = call.op();
        let not_found = not_found_error(&call);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        trace!(target: "tabtrail::bridge::frame", "-> call {} {}", id, op);

        if self.outbound.send(BridgeFrame::Call { id, call }).is_err() {
            self.pending.remove(&id);
            return Err(HostError::Disconnected);
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(failure))) => Err(match not_found {
                Some(stale) if failure.is_not_found() => stale,
                _ => HostError::CallFailed {
                    op: op.to_string(),
                    message: failure.message,
                },
            }),
            Ok(Err(_)) => Err(HostError::Disconnected),
            Err(_) => {
                self.pending.remove(&id);
                warn!(target: "tabtrail::bridge", "Call {} ({}) timed out", id, op);
                Err(HostError::Timeout(op.to_string()))
            }
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, call: HostCall) -> Result<T, HostError> {
        let op = call.op();
        let value = self.call(call).await?;
        serde_json::from_value(value).map_err(|e| HostError::Protocol {
            op: op.to_string(),
            message: e.to_string(),
        })
    }

    async fn call_unit(&self, call: HostCall) -> Result<(), HostError> {
        self.call(call).await.map(|_| ())
    }

    fn resolve(&self, id: u64, ok: Option<Value>, error: Option<CallFailure>) {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                // The caller may have timed out already.
                let _ = tx.send(reply_result(ok, error));
            }
            None => debug!(target: "tabtrail::bridge", "Reply {} has no pending call", id),
        }
    }
}

/// Error a `not_found` failure stands for, given the call's subject.
fn not_found_error(call: &HostCall) -> Option<HostError> {
    match call {
        HostCall::GetTab { tab_id }
        | HostCall::UpdateTab { tab_id, .. }
        | HostCall::RemoveTab { tab_id }
        | HostCall::SendMessage { tab_id, .. } => Some(HostError::TabNotFound(*tab_id)),
        HostCall::GetWindow { window_id } | HostCall::UpdateWindow { window_id, .. } => {
            Some(HostError::WindowNotFound(*window_id))
        }
        _ => None,
    }
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<BridgeFrame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(target: "tabtrail::bridge", "Failed to write frame: {}", e);
            if matches!(e, BridgeError::Io(_)) {
                break;
            }
        }
    }
    debug!(target: "tabtrail::bridge", "Writer stopped");
}

async fn read_loop<R>(mut reader: R, bridge: Arc<Bridge>, inbound: mpsc::UnboundedSender<Inbound>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(target: "tabtrail::bridge", "Shim closed the pipe");
                break;
            }
            Err(BridgeError::Json(e)) => {
                // The body was consumed, so the stream is still aligned.
                warn!(target: "tabtrail::bridge", "Skipping malformed frame: {}", e);
                continue;
            }
            Err(e) => {
                warn!(target: "tabtrail::bridge", "Read failed: {}", e);
                break;
            }
        };

        match frame {
            BridgeFrame::Reply { id, ok, error } => {
                trace!(target: "tabtrail::bridge::frame", "<- reply {}", id);
                bridge.resolve(id, ok, error);
            }
            BridgeFrame::Event { event } => {
                trace!(target: "tabtrail::bridge::frame", "<- event {:?}", event);
                if inbound.send(Inbound::Event(event)).is_err() {
                    break;
                }
            }
            BridgeFrame::Message { id, sender, body } => {
                trace!(target: "tabtrail::bridge::frame", "<- message {}", id);
                if inbound.send(Inbound::Message { id, sender, body }).is_err() {
                    break;
                }
            }
            BridgeFrame::Call { id, .. } | BridgeFrame::Respond { id, .. } => {
                warn!(target: "tabtrail::bridge", "Ignoring host-bound frame {} from shim", id);
            }
        }
    }
    bridge.close();
}

#[async_trait]
impl TabHost for Bridge {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<TabInfo>, HostError> {
        self.call_as(HostCall::QueryTabs { query }).await
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        self.call_as(HostCall::GetTab { tab_id }).await
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call_unit(HostCall::UpdateTab {
            tab_id,
            active: true,
        })
        .await
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call_unit(HostCall::RemoveTab { tab_id }).await
    }

    async fn get_window(&self, window_id: WindowId) -> Result<WindowInfo, HostError> {
        self.call_as(HostCall::GetWindow { window_id }).await
    }

    async fn get_all_windows(&self) -> Result<Vec<WindowInfo>, HostError> {
        self.call_as(HostCall::GetAllWindows).await
    }

    async fn last_focused_window(&self) -> Result<Option<WindowInfo>, HostError> {
        self.call_as(HostCall::GetLastFocusedWindow).await
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError> {
        self.call_unit(HostCall::UpdateWindow {
            window_id,
            focused: true,
        })
        .await
    }

    async fn create_window(&self, spec: WindowSpec) -> Result<WindowInfo, HostError> {
        self.call_as(HostCall::CreateWindow { spec }).await
    }

    async fn extension_url(&self, path: &str) -> Result<String, HostError> {
        self.call_as(HostCall::ExtensionUrl {
            path: path.to_string(),
        })
        .await
    }

    async fn send_message(&self, tab_id: TabId, push: ObserverPush) -> Result<(), HostError> {
        self.call_unit(HostCall::SendMessage { tab_id, body: push })
            .await
    }

    async fn menu_remove_all(&self) -> Result<(), HostError> {
        self.call_unit(HostCall::MenuRemoveAll).await
    }

    async fn menu_create(&self, item: MenuItem) -> Result<(), HostError> {
        self.call_unit(HostCall::MenuCreate { item }).await
    }
}

#[async_trait]
impl KvStore for Bridge {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        let value = self
            .call(HostCall::StorageGet {
                key: key.to_string(),
            })
            .await?;
        Ok(match value {
            Value::Null => None,
            value => Some(value),
        })
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.call_unit(HostCall::StorageSet {
            key: key.to_string(),
            value,
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), HostError> {
        self.call_unit(HostCall::StorageRemove {
            key: key.to_string(),
        })
        .await
    }
}
