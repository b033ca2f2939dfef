use std::time::Duration;

use crate::{GenerationOutcome, TabId};

/// Delay before re-checking a tab whose channel the user dismissed.
pub const REATTACH_DELAY: Duration = Duration::from_secs(2);
/// Delay between a tab switch and attaching to the newly active tab.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Attach {
        tab_id: TabId,
    },
    EnableNetwork {
        tab_id: TabId,
    },
    Detach {
        tab_id: TabId,
    },
    FetchResponseBody {
        tab_id: TabId,
        request_id: String,
    },
    Notify {
        tab_id: TabId,
        outcome: GenerationOutcome,
    },
    /// Fire `Msg::TimerFired` for `tab_id` after `delay`, with a fresh tab snapshot.
    Schedule {
        tab_id: TabId,
        timer: TimerKind,
        delay: Duration,
    },
}

impl Effect {
    pub fn tab_id(&self) -> TabId {
        match self {
            Effect::Attach { tab_id }
            | Effect::EnableNetwork { tab_id }
            | Effect::Detach { tab_id }
            | Effect::FetchResponseBody { tab_id, .. }
            | Effect::Notify { tab_id, .. }
            | Effect::Schedule { tab_id, .. } => *tab_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    SettleAttach,
    ReattachAfterCancel,
}

impl TimerKind {
    pub fn delay(self) -> Duration {
        match self {
            TimerKind::SettleAttach => SETTLE_DELAY,
            TimerKind::ReattachAfterCancel => REATTACH_DELAY,
        }
    }
}
