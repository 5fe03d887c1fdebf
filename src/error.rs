use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Failures at the extraction tool boundary.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The executable could not be started at all.
    #[error("failed to start extraction tool `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but exited non-zero or printed nothing.
    #[error("extraction tool failed (exit code {}): {stderr}", exit_code_label(.exit_code))]
    Execution { exit_code: Option<i32>, stderr: String },

    /// The tool was killed after exceeding the configured timeout.
    #[error("extraction tool timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// Exit code 0, but stdout was not a video info document.
    #[error("extraction tool returned malformed output: {0}")]
    ResponseParse(#[from] serde_json::Error),
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl ExtractionError {
    /// Stable machine-readable tag used in error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Launch { .. } => "tool_launch",
            Self::Execution { .. } => "extraction_failed",
            Self::Timeout { .. } => "timeout",
            Self::ResponseParse(_) => "response_parse",
        }
    }

    /// True for a tool-reported failure whose diagnostics look like the
    /// host refused access. Launch failures and timeouts never qualify.
    pub fn is_access_denied(&self) -> bool {
        match self {
            Self::Execution { stderr, .. } => crate::retry::is_access_denied(stderr),
            _ => false,
        }
    }
}

/// Errors surfaced by the HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Extraction(ExtractionError),
}

impl From<ExtractionError> for AppError {
    fn from(err: ExtractionError) -> Self {
        Self::Extraction(err)
    }
}

// This implementation allows us to convert our AppError into a valid HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message, details, hint) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "input", msg, None, None),
            AppError::Extraction(err) => {
                let kind = err.kind();
                match err {
                    ExtractionError::Launch { program, source } => {
                        tracing::error!("Extraction tool `{}` could not be started: {}", program, source);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            kind,
                            "The extraction tool is not installed or is misconfigured".to_string(),
                            Some(source.to_string()),
                            Some("Check `extraction_tool_path` in the service configuration"),
                        )
                    }
                    ExtractionError::Execution { stderr, .. } => {
                        let hint = diagnose(&stderr);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            kind,
                            "Unable to fetch video info. Check that the URL is correct and the video is accessible"
                                .to_string(),
                            Some(stderr),
                            hint,
                        )
                    }
                    ExtractionError::Timeout { after } => (
                        StatusCode::GATEWAY_TIMEOUT,
                        kind,
                        format!("The extraction tool did not finish within {}s", after.as_secs()),
                        None,
                        Some("The video host may be slow or unreachable, try again later"),
                    ),
                    ExtractionError::ResponseParse(e) => {
                        tracing::error!("Extraction tool output violated the JSON contract: {}", e);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            kind,
                            "The extraction tool returned malformed video info".to_string(),
                            Some(e.to_string()),
                            None,
                        )
                    }
                }
            }
        };

        let mut body = json!({ "status": "error", "kind": kind, "error": message });
        if let Some(details) = details {
            body["details"] = json!(details);
        }
        if let Some(hint) = hint {
            body["hint"] = json!(hint);
        }
        (status, Json(body)).into_response()
    }
}

/// Maps tool diagnostics to a short piece of user guidance.
pub fn diagnose(stderr: &str) -> Option<&'static str> {
    let lower = stderr.to_lowercase();

    if lower.contains("private video") || lower.contains("video is private") {
        return Some("The video is private");
    }
    if lower.contains("not available in your country")
        || lower.contains("geo restrict")
        || lower.contains("geo-restrict")
    {
        return Some("The video appears to be region-restricted");
    }
    if lower.contains("sign in to confirm your age") || lower.contains("age-restricted") {
        return Some("The video is age-restricted and needs a signed-in session");
    }
    if lower.contains("not a bot") || lower.contains("429") {
        return Some("The host is rate limiting or challenging this server, try again later");
    }
    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("does not exist")
    {
        return Some("The video is unavailable or has been removed");
    }
    if lower.contains("unsupported url") {
        return Some("The URL is not supported by the extraction tool");
    }
    if lower.contains("timed out")
        || lower.contains("network is unreachable")
        || lower.contains("network unreachable")
        || lower.contains("failed to resolve")
        || lower.contains("connection refused")
    {
        return Some("The server could not reach the video host");
    }
    if crate::retry::is_access_denied(stderr) {
        return Some("Access was denied, the video may be private or region-restricted");
    }

    None
}
