//! Presentation feed: snapshots and change notifications for observers.
//!
//! Observers either subscribe to the broadcast channel (local HTTP clients)
//! or register as manager tabs, which are pushed to through the host.

use futures::future::join_all;
use tabtrail_types::{
    MessageSender, ObserverPush, ObserverRequest, ObserverResponse, TabEntry, TabInfo, TabQuery,
    WindowId,
};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::store::ordered_view;
use crate::{Engine, HostError};

const FEED_CAPACITY: usize = 256;

/// Broadcast side of the feed.
#[derive(Debug)]
pub struct PresentationFeed {
    tx: broadcast::Sender<ObserverPush>,
}

impl Default for PresentationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObserverPush> {
        self.tx.subscribe()
    }

    /// Announce a change in `window_id`. Returns how many subscribers saw it.
    pub fn publish(&self, window_id: WindowId) -> usize {
        // No subscribers is not an error.
        self.tx
            .send(ObserverPush::HistoryUpdated { window_id })
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Snapshot rows for an ordered tab list.
pub fn snapshot_entries(tabs: &[TabInfo]) -> Vec<TabEntry> {
    tabs.iter().map(TabEntry::from).collect()
}

impl Engine {
    pub fn subscribe(&self) -> broadcast::Receiver<ObserverPush> {
        self.feed.subscribe()
    }

    /// Live tabs of `window_id`, history entries first.
    pub async fn ordered_tabs(&self, window_id: WindowId) -> Result<Vec<TabInfo>, HostError> {
        let live = self.host.query_tabs(TabQuery::in_window(window_id)).await?;
        let state = self.state.lock().await;
        let entries = state
            .history
            .get(window_id)
            .map(|history| history.entries())
            .unwrap_or_default();
        Ok(ordered_view(entries, live))
    }

    /// The `get-history` snapshot of a window.
    pub async fn snapshot(&self, window_id: WindowId) -> Result<Vec<TabEntry>, HostError> {
        self.ensure_loaded(window_id).await;
        let tabs = self.ordered_tabs(window_id).await?;
        Ok(snapshot_entries(&tabs))
    }

    /// Tell every observer of `window_id` to refresh. Delivery failures are
    /// expected (pages close at any time) and ignored.
    pub async fn notify_observers(&self, window_id: WindowId) {
        let subscribers = self.feed.publish(window_id);
        let observers = self.state.lock().await.managers.observers_of(window_id);
        trace!(
            target: "tabtrail::feed",
            "Window {} changed: {} subscribers, {} managers",
            window_id, subscribers, observers.len()
        );

        let push = ObserverPush::HistoryUpdated { window_id };
        join_all(observers.into_iter().map(|tab_id| async move {
            if let Err(e) = self.host.send_message(tab_id, push).await {
                debug!(target: "tabtrail::feed", "Observer tab {} unreachable: {}", tab_id, e);
            }
        }))
        .await;
    }

    /// Answer a message from an extension page or a local observer.
    pub async fn handle_message(
        &self,
        sender: MessageSender,
        request: ObserverRequest,
    ) -> ObserverResponse {
        match request {
            ObserverRequest::GetHistory { window_id } => {
                let Some(window_id) = window_id.or(sender.window_id) else {
                    return ObserverResponse::empty_history();
                };
                match self.snapshot(window_id).await {
                    Ok(tabs) => ObserverResponse::History { tabs },
                    Err(e) => {
                        warn!(target: "tabtrail::feed", "Failed to snapshot window {}: {}", window_id, e);
                        ObserverResponse::empty_history()
                    }
                }
            }
            ObserverRequest::ActivateTab {
                tab_id,
                preserve_history,
            } => {
                if preserve_history {
                    self.activate_preserving_order(tab_id).await;
                } else if let Err(e) = self.host.activate_tab(tab_id).await {
                    debug!(target: "tabtrail::feed", "Failed to activate tab {}: {}", tab_id, e);
                }
                ObserverResponse::Ack
            }
            ObserverRequest::CloseTab { tab_id } => {
                if let Err(e) = self.host.remove_tab(tab_id).await {
                    debug!(target: "tabtrail::feed", "Failed to close tab {}: {}", tab_id, e);
                }
                ObserverResponse::Ack
            }
            ObserverRequest::RegisterManager { window_id } => {
                match sender.tab_id {
                    Some(tab_id) => {
                        self.state
                            .lock()
                            .await
                            .managers
                            .register(tab_id, sender.window_id, window_id);
                        info!(target: "tabtrail::feed", "Tab {} observes window {}", tab_id, window_id);
                    }
                    None => warn!(target: "tabtrail::feed", "Manager registration without a sender tab"),
                }
                ObserverResponse::Ack
            }
            ObserverRequest::UnregisterManager => {
                if let Some(tab_id) = sender.tab_id {
                    let target = self
                        .state
                        .lock()
                        .await
                        .managers
                        .unregister(tab_id, sender.window_id);
                    if let Some(target) = target {
                        info!(target: "tabtrail::feed", "Tab {} stopped observing window {}", tab_id, target);
                    }
                }
                ObserverResponse::Ack
            }
        }
    }
}
