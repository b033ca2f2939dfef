use vidtap_logging::{tab_debug, tab_info, tab_warn, tap_info};

use crate::state::AttachCompletion;
use crate::stream::{parse_stream, StreamTerminal};
use crate::{
    classify_request, AppState, AttachResult, AttachStatus, DetachReason, DetachStatus, Effect,
    GenerationOutcome, Msg, TabId, TabSnapshot, TimerKind,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let mut effects = Vec::new();
    match msg {
        Msg::NavigationCompleted { tab_id, url } => {
            if state.targets().is_target_page(&url) {
                tab_info!(tab_id, "target page loaded: {}", url);
                attach(&mut state, tab_id, &mut effects);
            } else if state.instrumentation(tab_id).is_some() {
                tab_info!(tab_id, "left target page: {}", url);
                detach(&mut state, tab_id, &mut effects);
            }
        }
        Msg::TabActivated { tab_id, url } => {
            let Some(url) = url else {
                tab_warn!(tab_id, "activated tab could not be resolved");
                return (state, effects);
            };
            let on_target = state.targets().is_target_page(&url);
            if state.any_busy() {
                tab_info!(tab_id, "activated while a job is in flight; keeping channels");
            } else {
                detach_all(&mut state, on_target.then_some(tab_id), &mut effects);
            }
            if on_target {
                schedule(tab_id, TimerKind::SettleAttach, &mut effects);
            }
        }
        Msg::TabRemoved { tab_id } => {
            if state.forget_tab(tab_id) {
                tab_info!(tab_id, "tab closed, releasing channel");
                effects.push(Effect::Detach { tab_id });
            }
        }
        Msg::AttachFinished { tab_id, result } => {
            apply_attach_result(&mut state, tab_id, result, &mut effects);
        }
        Msg::DetachFinished { tab_id, error } => match error {
            None => tab_info!(tab_id, "debugger detached"),
            Some(err) => tab_warn!(tab_id, "detach reported an error (state already cleared): {}", err),
        },
        Msg::ChannelDetached { tab_id, reason } => {
            tab_info!(tab_id, "channel closed externally: {:?}", reason);
            state.forget_tab(tab_id);
            if reason == DetachReason::UserCancelled {
                schedule(tab_id, TimerKind::ReattachAfterCancel, &mut effects);
            }
        }
        Msg::RequestSent { tab_id, request } => {
            if !state.is_attached(tab_id) {
                return (state, effects);
            }
            if let Some(submission) = classify_request(state.targets(), &request) {
                let previous = state.start_job(tab_id);
                tab_info!(
                    tab_id,
                    "video generation submitted (request {}, previous phase {:?})",
                    request.request_id,
                    previous
                );
                effects.push(Effect::Notify {
                    tab_id,
                    outcome: GenerationOutcome::Processing {
                        referer: submission.referer,
                    },
                });
            }
        }
        Msg::ResponseCompleted {
            tab_id,
            request_id,
            encoded_data_length,
        } => {
            if encoded_data_length > 0 && state.is_attached(tab_id) {
                effects.push(Effect::FetchResponseBody { tab_id, request_id });
            }
        }
        Msg::ResponseBodyLoaded {
            tab_id,
            request_id,
            body,
            received_at,
        } => {
            let Some(body) = body.filter(|b| !b.is_empty()) else {
                return (state, effects);
            };
            if state.instrumentation(tab_id).is_none() {
                tab_debug!(tab_id, "dropping body for {}: channel gone", request_id);
                return (state, effects);
            }
            if let Some(outcome) = fold_body(&mut state, tab_id, &body, received_at) {
                effects.push(Effect::Notify { tab_id, outcome });
            }
        }
        Msg::TimerFired { tab_id, timer, tab } => {
            if is_eligible(&state, tab.as_ref()) {
                tab_info!(tab_id, "{:?} timer fired, attaching", timer);
                attach(&mut state, tab_id, &mut effects);
            } else {
                tab_debug!(tab_id, "{:?} timer fired, tab no longer active on target page", timer);
            }
        }
    }

    (state, effects)
}

/// Idempotent attach. Pushes `Effect::Attach` only for a tab with no channel.
pub fn request_attach(state: &mut AppState, tab_id: TabId) -> (AttachStatus, Vec<Effect>) {
    let mut effects = Vec::new();
    let status = attach(state, tab_id, &mut effects);
    (status, effects)
}

/// Busy-guarded detach.
pub fn request_detach(state: &mut AppState, tab_id: TabId) -> (DetachStatus, Vec<Effect>) {
    let mut effects = Vec::new();
    let status = detach(state, tab_id, &mut effects);
    (status, effects)
}

fn attach(state: &mut AppState, tab_id: TabId, effects: &mut Vec<Effect>) -> AttachStatus {
    let status = state.begin_attach(tab_id);
    if status == AttachStatus::Requested {
        effects.push(Effect::Attach { tab_id });
    }
    status
}

fn detach(state: &mut AppState, tab_id: TabId, effects: &mut Vec<Effect>) -> DetachStatus {
    let busy = state.is_busy(tab_id);
    let status = state.request_detach(tab_id);
    match status {
        DetachStatus::Detached => effects.push(Effect::Detach { tab_id }),
        DetachStatus::Deferred if busy => {
            tab_info!(tab_id, "detach deferred: video generation in progress");
        }
        DetachStatus::Deferred => tab_debug!(tab_id, "detach deferred until attach completes"),
        DetachStatus::NotAttached => {}
    }
    status
}

fn detach_all(state: &mut AppState, keep: Option<TabId>, effects: &mut Vec<Effect>) {
    let tabs: Vec<TabId> = state
        .tracked_tabs()
        .into_iter()
        .filter(|tab| Some(*tab) != keep)
        .collect();
    if !tabs.is_empty() {
        tap_info!("detaching channels from tabs {:?}", tabs);
    }
    for tab_id in tabs {
        detach(state, tab_id, effects);
    }
}

fn schedule(tab_id: TabId, timer: TimerKind, effects: &mut Vec<Effect>) {
    effects.push(Effect::Schedule {
        tab_id,
        timer,
        delay: timer.delay(),
    });
}

fn is_eligible(state: &AppState, tab: Option<&TabSnapshot>) -> bool {
    tab.is_some_and(|tab| {
        tab.active
            && tab
                .url
                .as_deref()
                .is_some_and(|url| state.targets().is_target_page(url))
    })
}

fn apply_attach_result(
    state: &mut AppState,
    tab_id: TabId,
    result: AttachResult,
    effects: &mut Vec<Effect>,
) {
    let owned = match result {
        AttachResult::Attached => true,
        AttachResult::AlreadyHeld => false,
        AttachResult::Failed(reason) => {
            tab_warn!(tab_id, "attach failed: {}", reason);
            state.abandon_attach(tab_id);
            return;
        }
    };
    match state.finish_attach(tab_id) {
        AttachCompletion::Orphaned => {
            if owned {
                tab_info!(tab_id, "attach completed after tab was released; detaching");
                effects.push(Effect::Detach { tab_id });
            }
        }
        AttachCompletion::Attached { detach_pending } => {
            if owned {
                tab_info!(tab_id, "debugger attached");
            } else {
                tab_info!(tab_id, "channel already held by another debugger; marking attached");
            }
            if detach_pending {
                detach(state, tab_id, effects);
            } else if owned {
                effects.push(Effect::EnableNetwork { tab_id });
            }
        }
    }
}

fn fold_body(
    state: &mut AppState,
    tab_id: TabId,
    body: &str,
    received_at: String,
) -> Option<GenerationOutcome> {
    let verdict = parse_stream(body);
    if verdict.skipped_lines > 0 {
        tab_debug!(tab_id, "skipped {} non-JSON lines", verdict.skipped_lines);
    }
    let Some(terminal) = verdict.terminal else {
        if verdict.snapshots > 0 {
            tab_debug!(tab_id, "{} progress snapshots, still running", verdict.snapshots);
        }
        return None;
    };
    if !state.complete_job(tab_id) {
        tab_debug!(tab_id, "terminal outcome without a tracked submission");
    }
    let outcome = match terminal {
        StreamTerminal::Errored(error) => {
            tab_info!(tab_id, "video generation failed: {:?}", error);
            GenerationOutcome::Failed {
                error: Some(error),
                ts: Some(received_at),
            }
        }
        StreamTerminal::NoVideo => {
            tab_info!(tab_id, "video generation finished without a video");
            GenerationOutcome::Failed {
                error: None,
                ts: None,
            }
        }
        StreamTerminal::Ready(info) => {
            tab_info!(tab_id, "video ready: {}", info.video_url);
            GenerationOutcome::Ready(info)
        }
    };
    Some(outcome)
}
