//! Newline-delimited JSON decoding of streamed generation responses.
//!
//! Each non-blank line is an independent JSON document. Lines that fail to
//! decode are framing noise and are skipped. The decoded events are folded in
//! line order into a single [`StreamVerdict`].

use serde_json::{Map, Value};
use vidtap_logging::tap_trace;

use crate::outcome::{UpstreamError, VideoInfo};

/// Progress value that marks a terminal snapshot.
pub const TERMINAL_PROGRESS: u8 = 100;
/// Snapshots strictly below this progress may supply the original prompt.
pub const ORIGINAL_PROMPT_CEILING: u8 = 5;

const SNAPSHOT_KEY: &str = "streamingVideoGenerationResponse";

/// One generation-status object (`result.response.streamingVideoGenerationResponse`).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSnapshot {
    pub progress: Option<u8>,
    pub video_prompt: Option<String>,
    pub video_url: Option<String>,
    pub video_id: Option<String>,
    fields: Map<String, Value>,
}

impl VideoSnapshot {
    fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?.clone();
        let progress = fields.get("progress").and_then(progress_value);
        let video_prompt = fields
            .get("videoPrompt")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let video_url = fields
            .get("videoUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_owned);
        let video_id = fields.get("videoId").and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Some(Self {
            progress,
            video_prompt,
            video_url,
            video_id,
            fields,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.progress == Some(TERMINAL_PROGRESS)
    }

    fn into_video_info(
        self,
        video_url: String,
        original_prompt: Option<String>,
        full_response: Option<Value>,
    ) -> VideoInfo {
        const KNOWN: [&str; 4] = ["videoId", "videoUrl", "videoPrompt", "progress"];
        let extra = self
            .fields
            .into_iter()
            .filter(|(key, _)| !KNOWN.contains(&key.as_str()))
            .collect();
        VideoInfo {
            video_id: self.video_id,
            video_url,
            generated_prompt: self.video_prompt.clone(),
            video_prompt: self.video_prompt,
            progress: TERMINAL_PROGRESS,
            original_prompt,
            full_response,
            extra,
        }
    }
}

/// Accepts integral JSON numbers in `0..=100`.
fn progress_value(value: &Value) -> Option<u8> {
    let raw = match value.as_u64() {
        Some(n) => n,
        None => {
            let f = value.as_f64()?;
            if f.fract() != 0.0 || f < 0.0 {
                return None;
            }
            f as u64
        }
    };
    u8::try_from(raw).ok().filter(|p| *p <= TERMINAL_PROGRESS)
}

/// A decoded line of a streamed body.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Explicit upstream error payload.
    Error(UpstreamError),
    /// A `result.response` object, with its generation snapshot when present.
    Response {
        response: Value,
        video: Option<VideoSnapshot>,
    },
    /// Valid JSON that is not relevant to generation tracking.
    Unrelated,
}

/// Decodes one line. `None` means the line is not JSON.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let data: Value = serde_json::from_str(line).ok()?;

    if let Some(error) = data.get("error").filter(|e| is_truthy(e)) {
        return Some(StreamEvent::Error(upstream_error(error)));
    }

    let Some(response) = data.pointer("/result/response") else {
        return Some(StreamEvent::Unrelated);
    };
    if response.is_null() {
        return Some(StreamEvent::Unrelated);
    }
    let video = response
        .get(SNAPSHOT_KEY)
        .and_then(VideoSnapshot::from_value);
    Some(StreamEvent::Response {
        response: response.clone(),
        video,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn upstream_error(value: &Value) -> UpstreamError {
    match value {
        Value::Object(map) => UpstreamError {
            code: map.get("code").and_then(Value::as_i64),
            message: map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
        },
        Value::String(message) => UpstreamError {
            code: None,
            message: Some(message.clone()),
        },
        _ => UpstreamError {
            code: None,
            message: None,
        },
    }
}

/// Terminal decision for one response body.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamTerminal {
    /// Upstream error payload; only the first one in a body counts.
    Errored(UpstreamError),
    /// progress=100 with a video URL.
    Ready(VideoInfo),
    /// progress=100 without a video URL.
    NoVideo,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamVerdict {
    pub terminal: Option<StreamTerminal>,
    pub original_prompt: Option<String>,
    /// Number of generation snapshots seen, terminal or not.
    pub snapshots: usize,
    /// Non-blank lines that were not JSON.
    pub skipped_lines: usize,
}

/// Running accumulator over the decoded lines of one body.
#[derive(Debug, Default)]
struct StreamFold {
    full_response: Option<Value>,
    original_prompt: Option<String>,
    terminal: Option<StreamTerminal>,
    snapshots: usize,
    skipped_lines: usize,
}

impl StreamFold {
    fn push(&mut self, event: StreamEvent) {
        // Once a terminal decision is latched the rest of the body is inert.
        if self.terminal.is_some() {
            return;
        }
        match event {
            StreamEvent::Error(error) => {
                self.terminal = Some(StreamTerminal::Errored(error));
            }
            StreamEvent::Response { response, video } => {
                self.full_response = Some(response);
                if let Some(snapshot) = video {
                    self.push_snapshot(snapshot);
                }
            }
            StreamEvent::Unrelated => {}
        }
    }

    fn push_snapshot(&mut self, snapshot: VideoSnapshot) {
        self.snapshots += 1;
        if self.original_prompt.is_none()
            && snapshot
                .progress
                .is_some_and(|p| p < ORIGINAL_PROMPT_CEILING)
        {
            self.original_prompt = snapshot.video_prompt.clone();
        }
        if !snapshot.is_terminal() {
            return;
        }
        self.terminal = Some(match snapshot.video_url.clone() {
            Some(url) => StreamTerminal::Ready(snapshot.into_video_info(
                url,
                self.original_prompt.clone(),
                self.full_response.clone(),
            )),
            None => StreamTerminal::NoVideo,
        });
    }

    fn finish(self) -> StreamVerdict {
        StreamVerdict {
            terminal: self.terminal,
            original_prompt: self.original_prompt,
            snapshots: self.snapshots,
            skipped_lines: self.skipped_lines,
        }
    }
}

/// Folds a whole streamed body into its verdict.
pub fn parse_stream(body: &str) -> StreamVerdict {
    let mut fold = StreamFold::default();
    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match decode_line(line) {
            Some(event) => fold.push(event),
            None => {
                tap_trace!("skipping non-JSON stream line ({} bytes)", line.len());
                fold.skipped_lines += 1;
            }
        }
    }
    fold.finish()
}
