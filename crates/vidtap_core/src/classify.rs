use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// URL markers identifying the generation page and the submission endpoint.
///
/// A URL matches a marker when its `host + path` contains the marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Targets {
    pub page_marker: String,
    pub endpoint_marker: String,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            page_marker: "grok.com/imagine".to_string(),
            endpoint_marker: "grok.com/rest/app-chat/conversations".to_string(),
        }
    }
}

impl Targets {
    pub fn is_target_page(&self, url: &str) -> bool {
        matches_marker(url, &self.page_marker)
    }

    pub fn is_submission_endpoint(&self, url: &str) -> bool {
        matches_marker(url, &self.endpoint_marker)
    }
}

fn matches_marker(raw: &str, marker: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    format!("{host}{}", url.path()).contains(marker)
}

/// An outgoing request observed on an instrumented tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedRequest {
    pub request_id: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw text, a `{"text": ..}` wrapper, or an already-decoded object.
    #[serde(default)]
    pub post_data: Option<Value>,
}

impl InterceptedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A request recognised as a video-generation submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub referer: Option<String>,
}

/// Returns `Some` only for a POST to the endpoint whose JSON body has
/// `toolOverrides.videoGen == true`.
pub fn classify_request(targets: &Targets, request: &InterceptedRequest) -> Option<Submission> {
    if !request.method.eq_ignore_ascii_case("POST") || !targets.is_submission_endpoint(&request.url)
    {
        return None;
    }
    let body = normalize_body(request.post_data.as_ref()?)?;
    if body.pointer("/toolOverrides/videoGen") != Some(&Value::Bool(true)) {
        return None;
    }
    Some(Submission {
        referer: request.header("referer").map(str::to_owned),
    })
}

fn normalize_body(post_data: &Value) -> Option<Value> {
    match post_data {
        Value::String(text) => serde_json::from_str(text).ok(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(text)) => serde_json::from_str(text).ok(),
            _ => Some(post_data.clone()),
        },
        _ => None,
    }
}
