use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vidtap_core::{DetachReason, InterceptedRequest, Msg, TabId, TabSnapshot};

/// Browser-side operations the coordinator depends on.
///
/// Every call may be slow and may fail; callers treat failures as no-ops.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Opens the instrumentation channel on a tab.
    async fn attach(&self, tab_id: TabId) -> Result<(), HostError>;
    async fn detach(&self, tab_id: TabId) -> Result<(), HostError>;
    /// Turns on network event reporting for an attached tab.
    async fn enable_network(&self, tab_id: TabId) -> Result<(), HostError>;
    async fn response_body(&self, tab_id: TabId, request_id: &str) -> Result<String, HostError>;
    async fn send_message(&self, tab_id: TabId, message: &Value) -> Result<(), HostError>;
    /// Current facts about a tab; `Ok(None)` when the tab no longer exists.
    async fn tab(&self, tab_id: TabId) -> Result<Option<TabSnapshot>, HostError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("another debugger is already attached")]
    AlreadyAttached,
    #[error("no receiver in tab")]
    NoReceiver,
    #[error("host call timed out")]
    Timeout,
    #[error("host connection closed")]
    Disconnected,
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    /// Classifies an error string reported by the browser.
    pub fn from_message(message: &str) -> Self {
        if message.contains("Another debugger is already attached") {
            HostError::AlreadyAttached
        } else if message.contains("Receiving end does not exist")
            || message.contains("Could not establish connection")
        {
            HostError::NoReceiver
        } else {
            HostError::Failed(message.to_string())
        }
    }
}

/// Notifications pushed by the browser host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    NavigationCompleted {
        tab_id: TabId,
        url: String,
    },
    TabActivated {
        tab_id: TabId,
    },
    TabRemoved {
        tab_id: TabId,
    },
    ChannelDetached {
        tab_id: TabId,
        reason: DetachReason,
    },
    RequestSent {
        tab_id: TabId,
        request: InterceptedRequest,
    },
    ResponseCompleted {
        tab_id: TabId,
        request_id: String,
        #[serde(default)]
        encoded_data_length: f64,
    },
}

impl HostEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            HostEvent::NavigationCompleted { tab_id, .. }
            | HostEvent::TabActivated { tab_id }
            | HostEvent::TabRemoved { tab_id }
            | HostEvent::ChannelDetached { tab_id, .. }
            | HostEvent::RequestSent { tab_id, .. }
            | HostEvent::ResponseCompleted { tab_id, .. } => *tab_id,
        }
    }

    /// Direct translation to a core message. Tab activation needs a tab
    /// lookup first and yields `None` here.
    pub(crate) fn into_msg(self) -> Option<Msg> {
        let msg = match self {
            HostEvent::NavigationCompleted { tab_id, url } => {
                Msg::NavigationCompleted { tab_id, url }
            }
            HostEvent::TabActivated { .. } => return None,
            HostEvent::TabRemoved { tab_id } => Msg::TabRemoved { tab_id },
            HostEvent::ChannelDetached { tab_id, reason } => {
                Msg::ChannelDetached { tab_id, reason }
            }
            HostEvent::RequestSent { tab_id, request } => Msg::RequestSent { tab_id, request },
            HostEvent::ResponseCompleted {
                tab_id,
                request_id,
                encoded_data_length,
            } => Msg::ResponseCompleted {
                tab_id,
                request_id,
                encoded_data_length: if encoded_data_length > 0.0 {
                    encoded_data_length.ceil() as u64
                } else {
                    0
                },
            },
        };
        Some(msg)
    }
}
