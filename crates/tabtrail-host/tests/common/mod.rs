//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tabtrail_core::{HostError, KvStore, MemoryHost, MemoryStore, TabHost};
use tabtrail_host::bridge::Bridge;
use tabtrail_host::codec::{read_frame, write_frame};
use tabtrail_host::config::Config;
use tabtrail_host::event_loop::{self, ObserverQueue};
use tabtrail_host::state::AppState;
use tabtrail_types::{
    BridgeFrame, CallFailure, HostCall, HostCapabilities, HostEvent, MessageSender,
    ObserverRequest, ObserverResponse, NOT_FOUND,
};
use tokio::io::{duplex, DuplexStream};
use tokio::sync::{mpsc, Mutex};

/// Answer one host call the way the extension shim would, backed by in-memory
/// collaborators.
pub async fn serve_call(
    host: &MemoryHost,
    store: &MemoryStore,
    call: HostCall,
) -> Result<Value, CallFailure> {
    let result: Result<Value, HostError> = match call {
        HostCall::QueryTabs { query } => host.query_tabs(query).await.map(to_value),
        HostCall::GetTab { tab_id } => host.get_tab(tab_id).await.map(to_value),
        HostCall::UpdateTab { tab_id, .. } => host.activate_tab(tab_id).await.map(to_value),
        HostCall::RemoveTab { tab_id } => host.remove_tab(tab_id).await.map(to_value),
        HostCall::GetWindow { window_id } => host.get_window(window_id).await.map(to_value),
        HostCall::GetAllWindows => host.get_all_windows().await.map(to_value),
        HostCall::GetLastFocusedWindow => host.last_focused_window().await.map(to_value),
        HostCall::UpdateWindow { window_id, .. } => host.focus_window(window_id).await.map(to_value),
        HostCall::CreateWindow { spec } => host.create_window(spec).await.map(to_value),
        HostCall::SendMessage { tab_id, body } => host.send_message(tab_id, body).await.map(to_value),
        HostCall::StorageGet { key } => store.get(&key).await.map(to_value),
        HostCall::StorageSet { key, value } => store.set(&key, value).await.map(to_value),
        HostCall::StorageRemove { key } => store.remove(&key).await.map(to_value),
        HostCall::MenuRemoveAll => host.menu_remove_all().await.map(to_value),
        HostCall::MenuCreate { item } => host.menu_create(item).await.map(to_value),
        HostCall::ExtensionUrl { path } => host.extension_url(&path).await.map(to_value),
    };
    result.map_err(|e| {
        if e.is_stale() {
            CallFailure::new(NOT_FOUND, e.to_string())
        } else {
            CallFailure::new("error", e.to_string())
        }
    })
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap()
}

/// The browser side of a native messaging session: serves calls from a
/// `MemoryHost`, forwards its queued events and collects responses.
pub struct Shim {
    pub host: Arc<MemoryHost>,
    pub store: Arc<MemoryStore>,
    writer: Arc<Mutex<DuplexStream>>,
    responses: Mutex<mpsc::UnboundedReceiver<(u64, ObserverResponse)>>,
    next_message_id: std::sync::atomic::AtomicU64,
}

impl Shim {
    pub async fn send(&self, frame: BridgeFrame) {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame).await.unwrap();
    }

    pub async fn send_event(&self, event: HostEvent) {
        self.send(BridgeFrame::Event { event }).await;
    }

    /// Relay an observer message and wait for the host's answer. The host
    /// handles inbound frames in order, so earlier events are settled too.
    pub async fn request(&self, sender: MessageSender, body: ObserverRequest) -> ObserverResponse {
        let id = self
            .next_message_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.send(BridgeFrame::Message { id, sender, body }).await;

        let mut responses = self.responses.lock().await;
        let (answered, response) = tokio::time::timeout(Duration::from_secs(5), responses.recv())
            .await
            .expect("host did not answer")
            .expect("host closed the pipe");
        assert_eq!(answered, id);
        response
    }

    /// Forward queued browser events until the host stops causing new ones.
    pub async fn settle(&self) {
        loop {
            let events = self.host.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.send_event(event).await;
            }
            self.request(MessageSender::default(), ObserverRequest::GetHistory { window_id: None })
                .await;
        }
    }

    pub async fn hello(&self, capabilities: HostCapabilities) {
        self.host.take_events();
        self.send_event(HostEvent::Hello { capabilities }).await;
        self.settle().await;
        self.request(MessageSender::default(), ObserverRequest::GetHistory { window_id: None })
            .await;
    }
}

/// Start a host session over in-memory pipes: bridge, engine and event loop
/// on one side, a `Shim` on the other.
pub fn start_session(config: Config, host: Arc<MemoryHost>) -> (Arc<AppState>, Shim) {
    let store = Arc::new(MemoryStore::new());
    let (shim_out, host_in) = duplex(256 * 1024);
    let (host_out, mut shim_in) = duplex(256 * 1024);

    let (bridge, inbound) = Bridge::spawn(host_in, host_out, config.call_timeout());
    let (observers, observer_calls) = ObserverQueue::channel();
    let state = Arc::new(AppState::with_bridge(config, bridge.clone(), observers));
    tokio::spawn(event_loop::run(state.engine.clone(), bridge, inbound, observer_calls));

    let writer = Arc::new(Mutex::new(shim_out));
    let (responses_tx, responses_rx) = mpsc::unbounded_channel();

    {
        let host = host.clone();
        let store = store.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            while let Ok(Some(frame)) = read_frame(&mut shim_in).await {
                match frame {
                    BridgeFrame::Call { id, call } => {
                        let reply = match serve_call(&host, &store, call).await {
                            Ok(value) => BridgeFrame::reply_ok(id, value),
                            Err(failure) => BridgeFrame::reply_err(id, failure),
                        };
                        let mut writer = writer.lock().await;
                        if write_frame(&mut *writer, &reply).await.is_err() {
                            break;
                        }
                    }
                    BridgeFrame::Respond { id, body } => {
                        if responses_tx.send((id, body)).is_err() {
                            break;
                        }
                    }
                    other => panic!("unexpected frame from host: {:?}", other),
                }
            }
        });
    }

    let shim = Shim {
        host,
        store,
        writer,
        responses: Mutex::new(responses_rx),
        next_message_id: std::sync::atomic::AtomicU64::new(1),
    };
    (state, shim)
}
