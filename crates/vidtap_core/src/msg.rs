use serde::{Deserialize, Serialize};

use crate::{InterceptedRequest, TabId, TimerKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// A tab finished loading `url`.
    NavigationCompleted { tab_id: TabId, url: String },
    /// The user switched to `tab_id`; `url` is `None` when the lookup failed.
    TabActivated { tab_id: TabId, url: Option<String> },
    /// The tab was closed.
    TabRemoved { tab_id: TabId },
    /// Host answer to `Effect::Attach`.
    AttachFinished { tab_id: TabId, result: AttachResult },
    /// Host answer to `Effect::Detach`.
    DetachFinished {
        tab_id: TabId,
        error: Option<String>,
    },
    /// The channel was closed from outside this process.
    ChannelDetached {
        tab_id: TabId,
        reason: DetachReason,
    },
    /// Outgoing request seen on an instrumented tab.
    RequestSent {
        tab_id: TabId,
        request: InterceptedRequest,
    },
    /// A response finished loading.
    ResponseCompleted {
        tab_id: TabId,
        request_id: String,
        encoded_data_length: u64,
    },
    /// Host answer to `Effect::FetchResponseBody`; `None` when retrieval failed.
    ResponseBodyLoaded {
        tab_id: TabId,
        request_id: String,
        body: Option<String>,
        received_at: String,
    },
    /// A scheduled timer expired. `tab` is the fresh snapshot, `None` if the tab is gone.
    TimerFired {
        tab_id: TabId,
        timer: TimerKind,
        tab: Option<TabSnapshot>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachResult {
    Attached,
    /// Another consumer holds the channel; treated as attached.
    AlreadyHeld,
    Failed(String),
}

/// Why the host closed a channel on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachReason {
    #[serde(rename = "canceled_by_user")]
    UserCancelled,
    TargetClosed,
    #[serde(other)]
    Other,
}

/// Tab facts looked up at the moment a decision is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub active: bool,
    #[serde(default)]
    pub url: Option<String>,
}
