use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::invoker::{Extractor, ProcessRunner, ToolRunner};

// --- Modules ---
pub mod client;
pub mod config;
pub mod daemon;
pub mod download;
pub mod error;
pub mod formats;
pub mod handlers;
pub mod invoker;
pub mod metadata;
pub mod models;
pub mod retry;

/// Per-process state shared by all handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub extractor: Extractor,
}

impl AppState {
    pub fn new(config: Config, runner: Arc<dyn ToolRunner>) -> Self {
        let extractor = Extractor::new(&config, runner);
        Self { config: Arc::new(config), extractor }
    }

    /// State that spawns the real extraction tool.
    pub fn with_process_runner(config: Config) -> Self {
        Self::new(config, Arc::new(ProcessRunner))
    }
}

/// Builds the HTTP router. The `/api/...` paths are the names the browser
/// extension calls.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/extractor-status", get(handlers::get_extractor_status))
        .route("/parse", post(handlers::parse_video))
        .route("/api/test", get(handlers::get_status))
        .route("/api/check-ytdlp", get(handlers::get_extractor_status))
        .route("/api/parse-video", post(handlers::parse_video))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .with_state(state)
}

/// Runs the server until Ctrl-C.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_address();

    match state.extractor.tool_version().await {
        Ok(version) => {
            tracing::info!("Extraction tool '{}' ready, version {}", state.extractor.program(), version)
        }
        Err(e) => {
            tracing::warn!("Extraction tool '{}' may not be installed correctly: {}", state.extractor.program(), e)
        }
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting server in foreground, listening on {}", addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
