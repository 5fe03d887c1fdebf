use crate::{
    error::{AppError, ExtractionError},
    metadata::project_summary,
    models::{ExtractorStatus, ParseRequest, ParseResponse, RawVideoInfo, ServiceStatus, VideoSummary},
    retry::extract_with_retry,
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

pub const ENDPOINTS: &[&str] = &[
    "GET  /status - service health",
    "GET  /extractor-status - extraction tool availability",
    "POST /parse - video info parsing",
];

// ===================================================================
//                          STATUS HANDLERS
// ===================================================================

/// # GET /status - Describes the service; no side effects.
pub async fn get_status() -> impl IntoResponse {
    Json(ServiceStatus {
        status: "success",
        message: "Video parsing service is running".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        architecture: "parsing-only",
        endpoints: ENDPOINTS.to_vec(),
    })
}

/// # GET /extractor-status - Asks the extraction tool for its version.
pub async fn get_extractor_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.extractor.tool_version().await {
        Ok(version) => {
            tracing::info!("Extraction tool available, version {}", version);
            (
                StatusCode::OK,
                Json(ExtractorStatus {
                    status: "success",
                    version: Some(version),
                    message: Some("Extraction tool is available".to_string()),
                    error: None,
                }),
            )
        }
        Err(err @ ExtractionError::Launch { .. }) => {
            tracing::warn!("Extraction tool not found: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExtractorStatus {
                    status: "error",
                    version: None,
                    message: Some("Extraction tool is not installed".to_string()),
                    error: Some(err.to_string()),
                }),
            )
        }
        Err(err) => {
            tracing::warn!("Extraction tool unavailable: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExtractorStatus {
                    status: "error",
                    version: None,
                    message: Some("Extraction tool is unavailable, check the installation".to_string()),
                    error: None,
                }),
            )
        }
    }
}

// ===================================================================
//                          PARSE HANDLER
// ===================================================================

/// # POST /parse - Extracts, normalizes and returns info for one video URL.
pub async fn parse_video(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e.body_text())))?;
    let url = validate_url(request.url.as_deref())?;

    tracing::info!("Parsing video: {}", url);
    let summary = parse_url(&state, url).await?;
    tracing::info!("Parsed '{}' with {} formats", summary.title, summary.formats.len());

    Ok((StatusCode::OK, Json(ParseResponse::success(summary))))
}

// ===================================================================
//                          HELPER FUNCTIONS
// ===================================================================

/// Rejects a missing or blank URL before any subprocess is spawned.
pub fn validate_url(url: Option<&str>) -> Result<&str, AppError> {
    match url.map(str::trim) {
        Some(url) if !url.is_empty() => Ok(url),
        _ => Err(AppError::BadRequest("Please provide a video URL".to_string())),
    }
}

/// The full pipeline for one URL: extraction (with retry), decoding and projection.
pub async fn parse_url(state: &AppState, url: &str) -> Result<VideoSummary, ExtractionError> {
    let json = extract_with_retry(&state.extractor, url, state.config.retry_profile()).await?;
    let info = RawVideoInfo::from_tool_output(&json).map_err(|e| {
        tracing::error!("Extraction tool output for {} is not a video document: {}", url, e);
        e
    })?;
    Ok(project_summary(&info, url))
}
