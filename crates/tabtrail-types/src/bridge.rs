//! Native messaging envelope between the extension shim and the host process.
//!
//! The shim forwards browser events and observer messages; the host issues
//! calls back into the browser and answers observer messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    HostCapabilities, MessageSender, ObserverPush, ObserverRequest, ObserverResponse, TabChange,
    TabId, TabInfo, TabQuery, UserCommand, WindowId, WindowSpec,
};

/// Failure code the shim reports when a tab or window no longer exists.
pub const NOT_FOUND: &str = "not_found";

/// Browser events forwarded by the shim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// First frame after the shim connects.
    Hello {
        #[serde(default)]
        capabilities: HostCapabilities,
    },
    /// The extension was installed or updated.
    Installed,
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
    },
    TabCreated {
        tab: TabInfo,
    },
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        change: TabChange,
        tab: TabInfo,
    },
    TabRemoved {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        is_window_closing: bool,
    },
    WindowRemoved {
        window_id: WindowId,
    },
    WindowFocusChanged {
        window_id: WindowId,
    },
    /// Toolbar button clicked while `tab` was active.
    ActionClicked {
        tab: TabInfo,
    },
    Command {
        command: UserCommand,
    },
    MenuShown {
        #[serde(default)]
        tab: Option<TabInfo>,
    },
    MenuClicked {
        menu_item_id: String,
        #[serde(default)]
        tab: Option<TabInfo>,
    },
}

/// A context-menu item attached to the toolbar action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    pub contexts: Vec<String>,
}

impl MenuItem {
    /// Item shown in the toolbar action's context menu.
    pub fn action(id: impl Into<String>, parent_id: Option<&str>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(String::from),
            title: title.into(),
            contexts: vec!["action".to_string()],
        }
    }
}

/// Calls the host process issues into the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostCall {
    QueryTabs { query: TabQuery },
    GetTab { tab_id: TabId },
    UpdateTab { tab_id: TabId, active: bool },
    RemoveTab { tab_id: TabId },
    GetWindow { window_id: WindowId },
    /// All windows, populated with their tabs.
    GetAllWindows,
    GetLastFocusedWindow,
    UpdateWindow { window_id: WindowId, focused: bool },
    CreateWindow { spec: WindowSpec },
    SendMessage { tab_id: TabId, body: ObserverPush },
    StorageGet { key: String },
    StorageSet { key: String, value: Value },
    StorageRemove { key: String },
    MenuRemoveAll,
    MenuCreate { item: MenuItem },
    ExtensionUrl { path: String },
}

impl HostCall {
    /// Short operation name for logs and errors.
    pub fn op(&self) -> &'static str {
        match self {
            HostCall::QueryTabs { .. } => "query_tabs",
            HostCall::GetTab { .. } => "get_tab",
            HostCall::UpdateTab { .. } => "update_tab",
            HostCall::RemoveTab { .. } => "remove_tab",
            HostCall::GetWindow { .. } => "get_window",
            HostCall::GetAllWindows => "get_all_windows",
            HostCall::GetLastFocusedWindow => "get_last_focused_window",
            HostCall::UpdateWindow { .. } => "update_window",
            HostCall::CreateWindow { .. } => "create_window",
            HostCall::SendMessage { .. } => "send_message",
            HostCall::StorageGet { .. } => "storage_get",
            HostCall::StorageSet { .. } => "storage_set",
            HostCall::StorageRemove { .. } => "storage_remove",
            HostCall::MenuRemoveAll => "menu_remove_all",
            HostCall::MenuCreate { .. } => "menu_create",
            HostCall::ExtensionUrl { .. } => "extension_url",
        }
    }
}

/// Error reported by the shim for a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFailure {
    pub code: String,
    pub message: String,
}

impl CallFailure {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND
    }
}

/// One native messaging frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeFrame {
    /// Shim -> host: browser event.
    Event { event: HostEvent },
    /// Host -> shim: call into the browser.
    Call { id: u64, call: HostCall },
    /// Shim -> host: outcome of a call.
    Reply {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ok: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<CallFailure>,
    },
    /// Shim -> host: message from an extension page.
    Message {
        id: u64,
        #[serde(default)]
        sender: MessageSender,
        body: ObserverRequest,
    },
    /// Host -> shim: answer to a relayed message.
    Respond { id: u64, body: ObserverResponse },
}

impl BridgeFrame {
    /// Successful reply carrying `value`.
    pub fn reply_ok(id: u64, value: Value) -> Self {
        BridgeFrame::Reply {
            id,
            ok: Some(value),
            error: None,
        }
    }

    /// Failed reply.
    pub fn reply_err(id: u64, failure: CallFailure) -> Self {
        BridgeFrame::Reply {
            id,
            ok: None,
            error: Some(failure),
        }
    }
}

/// Collapse a reply's `ok`/`error` pair into a result. A reply with neither is a
/// successful call without a return value.
pub fn reply_result(ok: Option<Value>, error: Option<CallFailure>) -> Result<Value, CallFailure> {
    match error {
        Some(failure) => Err(failure),
        None => Ok(ok.unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_frame_shape() {
        let json = r#"{"kind":"event","event":{"type":"tab_activated","tab_id":3,"window_id":1}}"#;
        let frame: BridgeFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame,
            BridgeFrame::Event {
                event: HostEvent::TabActivated {
                    tab_id: 3,
                    window_id: 1
                }
            }
        );
    }

    #[test]
    fn test_call_frame_shape() {
        let frame = BridgeFrame::Call {
            id: 42,
            call: HostCall::UpdateTab {
                tab_id: 8,
                active: true,
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["kind"], "call");
        assert_eq!(json["id"], 42);
        assert_eq!(json["call"]["op"], "update_tab");
        assert_eq!(json["call"]["tab_id"], 8);
    }

    #[test]
    fn test_reply_result_variants() {
        assert_eq!(reply_result(None, None), Ok(Value::Null));
        assert_eq!(
            reply_result(Some(Value::from(3)), None),
            Ok(Value::from(3))
        );
        let err = reply_result(None, Some(CallFailure::new(NOT_FOUND, "No tab with id: 3")))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_hello_without_capabilities() {
        let frame: BridgeFrame =
            serde_json::from_str(r#"{"kind":"event","event":{"type":"hello"}}"#).unwrap();
        match frame {
            BridgeFrame::Event {
                event: HostEvent::Hello { capabilities },
            } => assert!(!capabilities.context_menus),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_message_frame_defaults_sender() {
        let json = r#"{"kind":"message","id":5,"body":{"type":"get-history","window_id":2}}"#;
        let frame: BridgeFrame = serde_json::from_str(json).unwrap();
        match frame {
            BridgeFrame::Message { id, sender, body } => {
                assert_eq!(id, 5);
                assert_eq!(sender, MessageSender::default());
                assert_eq!(body, ObserverRequest::GetHistory { window_id: Some(2) });
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
