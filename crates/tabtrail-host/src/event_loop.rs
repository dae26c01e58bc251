//! Drives the engine from the shim's inbound frames and the observer feed.

use std::sync::Arc;

use tabtrail_core::Engine;
use tabtrail_types::{MessageSender, ObserverRequest, ObserverResponse};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::bridge::{Bridge, Inbound};

/// Requests from local observers waiting for the loop.
const OBSERVER_QUEUE_DEPTH: usize = 64;

/// An observer request from the HTTP feed, answered through `reply`.
#[derive(Debug)]
pub struct ObserverCall {
    pub sender: MessageSender,
    pub body: ObserverRequest,
    pub reply: oneshot::Sender<ObserverResponse>,
}

/// Hands observer requests to the event loop so they run between inbound
/// frames, never alongside them.
#[derive(Debug, Clone)]
pub struct ObserverQueue {
    tx: mpsc::Sender<ObserverCall>,
}

impl ObserverQueue {
    pub fn channel() -> (Self, mpsc::Receiver<ObserverCall>) {
        let (tx, rx) = mpsc::channel(OBSERVER_QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    /// Queue a request and wait for its answer. `None` once the loop stopped.
    pub async fn request(&self, sender: MessageSender, body: ObserverRequest) -> Option<ObserverResponse> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(ObserverCall {
                sender,
                body,
                reply,
            })
            .await
            .ok()?;
        answer.await.ok()
    }
}

/// Handle inbound work one item at a time until the shim closes the pipe.
/// Shim frames are taken in arrival order; observer requests are interleaved
/// between them. Host replies keep flowing while a handler awaits them because
/// the bridge reads them on its own task.
pub async fn run(
    engine: Arc<Engine>,
    bridge: Arc<Bridge>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut observers: mpsc::Receiver<ObserverCall>,
) {
    let mut handled: u64 = 0;
    loop {
        tokio::select! {
            item = inbound.recv() => {
                let Some(item) = item else {
                    break;
                };
                match item {
                    Inbound::Event(event) => {
                        debug!(target: "tabtrail::bridge", "Event: {:?}", event);
                        engine.handle_event(event).await;
                    }
                    Inbound::Message { id, sender, body } => {
                        debug!(target: "tabtrail::bridge", "Message {} from {:?}: {:?}", id, sender, body);
                        let response = engine.handle_message(sender, body).await;
                        bridge.respond(id, response);
                    }
                }
                handled += 1;
            }
            Some(call) = observers.recv() => {
                debug!(target: "tabtrail::http", "Observer request from {:?}: {:?}", call.sender, call.body);
                let response = engine.handle_message(call.sender, call.body).await;
                if call.reply.send(response).is_err() {
                    debug!(target: "tabtrail::http", "Observer went away before its answer");
                }
            }
        }
    }
    bridge.close();
    info!(target: "tabtrail::bridge", "Event loop finished after {} inbound frames", handled);
}
