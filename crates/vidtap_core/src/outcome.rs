use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error detail from an upstream `{"error": {"code": .., "message": ..}}` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Aggregated description of a finished video, handed to the editing surface.
///
/// Unknown snapshot fields are carried through `extra` so the consumer sees
/// everything the upstream reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,
    pub progress: u8,
    /// Prompt reported on the progress=100 snapshot.
    #[serde(rename = "generated_prompt", default)]
    pub generated_prompt: Option<String>,
    /// Prompt captured from the earliest snapshot below 5%.
    #[serde(default)]
    pub original_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_response: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What the consumer is told about a generation job.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Processing {
        referer: Option<String>,
    },
    Failed {
        error: Option<UpstreamError>,
        ts: Option<String>,
    },
    Ready(VideoInfo),
}

impl GenerationOutcome {
    pub fn to_message(&self) -> ConsumerMessage {
        match self {
            GenerationOutcome::Processing { referer } => ConsumerMessage::VideoProcessing {
                status: ProcessingStatus::Processing,
                error: None,
                referer: referer.clone(),
                ts: None,
            },
            GenerationOutcome::Failed { error, ts } => ConsumerMessage::VideoProcessing {
                status: ProcessingStatus::Failed,
                error: error.clone(),
                referer: None,
                ts: ts.clone(),
            },
            GenerationOutcome::Ready(info) => ConsumerMessage::VideoDetected {
                video_info: info.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Failed,
}

/// Wire shape of the message sent to the tab's content surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ConsumerMessage {
    #[serde(rename = "videoProcessing")]
    VideoProcessing {
        status: ProcessingStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<UpstreamError>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        referer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<String>,
    },
    #[serde(rename = "videoDetected")]
    VideoDetected {
        #[serde(rename = "videoInfo")]
        video_info: VideoInfo,
    },
}
