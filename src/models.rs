use serde::{de::Error as _, Deserialize, Serialize};
use serde_json::Value;

// === API Request/Response Models ===

/// The JSON body for a `POST /parse` request.
///
/// `url` is optional at the serde level so a missing field reaches the
/// handler and is reported as an input error instead of a decoder rejection.
#[derive(Deserialize, Debug, Default)]
pub struct ParseRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// `{status: "success", data}` envelope returned by `POST /parse`.
#[derive(Serialize, Debug)]
pub struct ParseResponse {
    pub status: &'static str,
    pub data: VideoSummary,
}

impl ParseResponse {
    pub fn success(data: VideoSummary) -> Self {
        Self { status: "success", data }
    }
}

/// Body of `GET /status`.
#[derive(Serialize, Debug)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub message: String,
    pub version: &'static str,
    pub architecture: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Body of `GET /extractor-status`.
#[derive(Serialize, Debug)]
pub struct ExtractorStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === Extraction Tool Output ===

/// The top-level JSON document printed by `yt-dlp --dump-json`.
///
/// Every field is optional: the tool omits or nulls whatever the extractor
/// could not determine.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct RawVideoInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub upload_date: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub extractor: Option<String>,
    pub extractor_key: Option<String>,
    pub formats: Option<Vec<RawFormat>>,
}

impl RawVideoInfo {
    /// Decodes stdout of `--dump-json`. Anything other than a single video
    /// object with an `id` is rejected, so arrays, `null` and playlist
    /// documents surface as malformed output instead of an empty summary.
    pub fn from_tool_output(stdout: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(stdout)?;
        let Value::Object(doc) = &value else {
            return Err(serde_json::Error::custom("expected a JSON object"));
        };
        if let Some(kind) = doc.get("_type").and_then(Value::as_str) {
            if kind != "video" {
                return Err(serde_json::Error::custom(format!(
                    "expected a video document, got `{}`",
                    kind
                )));
            }
        }
        if !doc.get("id").is_some_and(Value::is_string) {
            return Err(serde_json::Error::custom("video document has no `id`"));
        }
        serde_json::from_value(value)
    }
}

/// A single rendition descriptor as reported by the tool.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub protocol: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub url: Option<String>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    pub fps: Option<f64>,
    pub ext: Option<String>,
    pub tbr: Option<f64>, // Total Bitrate in KBit/s
    #[serde(rename = "__working")]
    pub working: Option<bool>,
}

// === Normalized Output ===

/// How the client should fetch a rendition.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    /// A single progressive HTTP(S) URL.
    Direct,
    /// A segmented manifest that needs a capable player.
    Stream,
}

/// A client-ready rendition. Wire names match what the browser extension reads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NormalizedFormat {
    pub quality: String,
    #[serde(rename = "format")]
    pub container: String,
    #[serde(rename = "fileSize")]
    pub file_size: String,
    pub fps: u32,
    #[serde(rename = "hasAudio")]
    pub has_audio: bool,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub format_id: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "downloadType")]
    pub download_kind: DownloadKind,
    pub bitrate: Option<f64>,
    #[serde(rename = "isRecommended")]
    pub recommended: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorInfo {
    pub extractor: Option<String>,
    pub extractor_key: Option<String>,
}

/// Display-ready projection of one video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub upload_date: String,
    pub channel_name: String,
    pub duration: String,
    pub formats: Vec<NormalizedFormat>,
    pub original_url: String,
    pub view_count: u64,
    pub like_count: u64,
    pub extractor_info: ExtractorInfo,
}
