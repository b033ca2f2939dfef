//! Vidtap core: pure tab/job state machine, traffic classification and
//! stream decoding.
mod classify;
mod effect;
mod msg;
mod outcome;
mod state;
mod stream;
mod update;
mod view_model;

pub use classify::{classify_request, InterceptedRequest, Submission, Targets};
pub use effect::{Effect, TimerKind, REATTACH_DELAY, SETTLE_DELAY};
pub use msg::{AttachResult, DetachReason, Msg, TabSnapshot};
pub use outcome::{
    ConsumerMessage, GenerationOutcome, ProcessingStatus, UpstreamError, VideoInfo,
};
pub use state::{AppState, AttachStatus, DetachStatus, Instrumentation, JobPhase, TabId};
pub use stream::{
    decode_line, parse_stream, StreamEvent, StreamTerminal, StreamVerdict, VideoSnapshot,
    ORIGINAL_PROMPT_CEILING, TERMINAL_PROGRESS,
};
pub use update::{request_attach, request_detach, update};
pub use view_model::{AppViewModel, TabRowView};
