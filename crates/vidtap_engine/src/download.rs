use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vidtap_logging::{tap_debug, tap_info, tap_warn};

use crate::filename::{sanitize_filename, video_basename};
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Clone)]
pub struct DownloadSettings {
    pub output_dir: PathBuf,
    /// Prefix for relative video paths.
    pub asset_base: String,
    pub upscale_endpoint: String,
    pub request_timeout: Duration,
    /// Local time stamp written into sidecars.
    pub now: Arc<dyn Fn() -> String + Send + Sync>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            asset_base: "https://assets.grok.com/".to_string(),
            upscale_endpoint: "https://grok.com/rest/media/video/upscale".to_string(),
            request_timeout: Duration::from_secs(60),
            now: Arc::new(|| chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string()),
        }
    }
}

/// `videoInfo` as sent by the editing surface with a download request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    #[serde(default)]
    pub video_id: Option<String>,
    pub video_url: String,
    #[serde(default)]
    pub video_prompt: Option<String>,
    #[serde(default)]
    pub original_prompt: Option<String>,
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub structured_data: Option<Value>,
}

/// Requests the editing surface sends back to this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ConsumerRequest {
    #[serde(rename = "downloadVideo")]
    DownloadVideo {
        #[serde(rename = "videoInfo")]
        video_info: DownloadRequest,
    },
    #[serde(rename = "downloadMetaOnly")]
    DownloadMetaOnly {
        #[serde(rename = "metaData")]
        meta_data: Value,
        filename: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConsumerReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Hd,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    pub quality: Quality,
}

/// Sidecar written next to every downloaded video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaDocument {
    pub structured_prompt: Value,
    pub original_prompt: Option<String>,
    pub metadata: MetaFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaFields {
    pub video_id: Option<String>,
    pub progress: Option<Value>,
    pub download_time: String,
    pub url: Option<String>,
    pub video_url: String,
    pub video_quality: Quality,
    pub is_hd: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub meta_path: PathBuf,
    pub video_path: PathBuf,
    pub source: ResolvedSource,
    pub bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("http client error: {0}")]
    Client(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Resolves the best available quality, then writes the sidecar and the video.
pub struct VideoDownloader {
    client: reqwest::Client,
    settings: DownloadSettings,
}

impl VideoDownloader {
    pub fn new(settings: DownloadSettings) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| DownloadError::Client(err.to_string()))?;
        Ok(Self { client, settings })
    }

    pub async fn handle(&self, request: ConsumerRequest) -> ConsumerReply {
        let result = match request {
            ConsumerRequest::DownloadVideo { video_info } => {
                self.download_video(&video_info).await.map(|report| {
                    tap_info!(
                        "downloaded {:?} video to {:?} ({} bytes)",
                        report.source.quality,
                        report.video_path,
                        report.bytes
                    );
                })
            }
            ConsumerRequest::DownloadMetaOnly {
                meta_data,
                filename,
            } => self.write_meta_only(&meta_data, &filename).map(|path| {
                tap_info!("wrote metadata to {:?}", path);
            }),
        };
        match result {
            Ok(()) => ConsumerReply::ok(),
            Err(err) => {
                tap_warn!("download failed: {}", err);
                ConsumerReply::failed(err.to_string())
            }
        }
    }

    /// Absolute URL for the normal-quality file.
    pub fn normal_url(&self, video_url: &str) -> String {
        if video_url.starts_with("http") {
            return video_url.to_string();
        }
        let base = self.settings.asset_base.trim_end_matches('/');
        format!("{base}/{}?cache=1", video_url.trim_start_matches('/'))
    }

    /// HD file if it already exists, else an upscale on demand, else normal.
    pub async fn resolve_source(&self, request: &DownloadRequest) -> ResolvedSource {
        let normal = self.normal_url(&request.video_url);
        if let Some(hd) = hd_candidate(&normal) {
            if self.exists(&hd).await {
                tap_debug!("HD video found at {}", hd);
                return ResolvedSource {
                    url: hd,
                    quality: Quality::Hd,
                };
            }
        }
        if let Some(video_id) = request.video_id.as_deref() {
            if let Some(url) = self.request_upscale(video_id).await {
                return ResolvedSource {
                    url,
                    quality: Quality::Hd,
                };
            }
        }
        ResolvedSource {
            url: normal,
            quality: Quality::Normal,
        }
    }

    pub async fn download_video(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadReport, DownloadError> {
        if request.video_url.trim().is_empty() {
            return Err(DownloadError::InvalidRequest("missing video url".into()));
        }
        let source = self.resolve_source(request).await;
        let basename = video_basename(request.video_id.as_deref(), &request.video_url);
        let writer = AtomicFileWriter::new(self.settings.output_dir.clone());

        let meta = self.meta_document(request, source.quality);
        let meta_path = writer.write(
            &format!("{basename}.json"),
            serde_json::to_string_pretty(&meta)?.as_bytes(),
        )?;

        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|err| DownloadError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus(status.as_u16()));
        }

        let mut pending = writer.begin(&format!("{basename}.mp4"))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| DownloadError::Network(err.to_string()))?;
            pending.write_chunk(&chunk)?;
        }
        let bytes = pending.bytes_written();
        let video_path = pending.commit()?;

        Ok(DownloadReport {
            meta_path,
            video_path,
            source,
            bytes,
        })
    }

    pub fn write_meta_only(&self, meta: &Value, filename: &str) -> Result<PathBuf, DownloadError> {
        let writer = AtomicFileWriter::new(self.settings.output_dir.clone());
        let path = writer.write(
            &sanitize_filename(filename),
            serde_json::to_string_pretty(meta)?.as_bytes(),
        )?;
        Ok(path)
    }

    pub fn meta_document(&self, request: &DownloadRequest, quality: Quality) -> MetaDocument {
        MetaDocument {
            structured_prompt: request.structured_data.clone().unwrap_or_else(|| json!({})),
            original_prompt: request.original_prompt.clone(),
            metadata: MetaFields {
                video_id: request.video_id.clone(),
                progress: request.progress.clone(),
                download_time: (self.settings.now)(),
                url: request.page_url.clone(),
                video_url: request.video_url.clone(),
                video_quality: quality,
                is_hd: quality == Quality::Hd,
            },
        }
    }

    async fn exists(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tap_debug!("HEAD {} failed: {}", url, err);
                false
            }
        }
    }

    async fn request_upscale(&self, video_id: &str) -> Option<String> {
        let payload = json!({ "videoId": video_id }).to_string();
        let response = match self
            .client
            .post(&self.settings.upscale_endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tap_debug!("upscale request error: {}", err);
                return None;
            }
        };
        if !response.status().is_success() {
            tap_debug!("upscale request failed: {}", response.status());
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        let body: Value = serde_json::from_slice(&bytes).ok()?;
        body.get("hdMediaUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
    }
}

/// First `.mp4` becomes `_hd.mp4`; `None` when the URL has no `.mp4`.
fn hd_candidate(normal: &str) -> Option<String> {
    normal
        .contains(".mp4")
        .then(|| normal.replacen(".mp4", "_hd.mp4", 1))
}
