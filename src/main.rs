use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use yt_parse_agent::client::{ServiceClient, DEFAULT_SERVICE_URL};
use yt_parse_agent::config::{load_config, Config};
use yt_parse_agent::download::{DownloadManager, DownloadRequest, DownloadState, HttpDownloadManager};
use yt_parse_agent::models::{NormalizedFormat, ParseResponse, VideoSummary};
use yt_parse_agent::{daemon, handlers, AppState};

// --- Command-Line Argument Parsing ---
#[derive(Parser, Debug)]
#[command(author, version, about = "Video info parsing service backed by yt-dlp.", long_about = None)]
struct Cli {
    /// Use this config file instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manages the server process.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
    /// Parses a video URL in-process and prints the JSON envelope.
    Parse { url: String },
    /// Asks a running service to parse a URL, then downloads one format.
    Fetch {
        url: String,
        /// Format to download; defaults to the first recommended one.
        #[arg(long)]
        format_id: Option<String>,
        /// Base URL of the parsing service.
        #[arg(long, default_value = DEFAULT_SERVICE_URL)]
        server: String,
        /// Directory to save into; defaults to `download_directory` from the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ServerAction {
    /// Start the server as a background process.
    Start,
    /// Stop the background server process.
    Stop,
    /// Restart the background server process.
    Restart,
    /// Run the server in the foreground.
    Run,
    /// Check the status of the background server process.
    Status,
}

// --- Main Application Logic ---
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Server { action } => match action {
            ServerAction::Start => daemon::start(config_path)?,
            ServerAction::Stop => daemon::stop()?,
            ServerAction::Restart => {
                daemon::stop()?;
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                daemon::start(config_path)?;
            }
            ServerAction::Run => run_server(load(config_path).await?).await?,
            ServerAction::Status => daemon::status()?,
        },
        Commands::Parse { url } => parse_once(load(config_path).await?, &url).await?,
        Commands::Fetch { url, format_id, server, output_dir } => {
            let config = load(config_path).await?;
            fetch(&config, &server, &url, format_id.as_deref(), output_dir).await?
        }
    }

    Ok(())
}

/// Logs go to stderr so `parse` output stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn load(config_path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let mut config = load_config(config_path).await?;
    config.apply_env_overrides();
    Ok(config)
}

// --- Command Functions ---

/// The core function that runs the Axum web server.
async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Extraction tool: '{}', timeout {}s, retry profile: {}",
        config.extraction_tool_path,
        config.subprocess_timeout().as_secs(),
        config.retry_profile().unwrap_or("disabled")
    );
    yt_parse_agent::serve(AppState::with_process_runner(config)).await
}

async fn parse_once(config: Config, url: &str) -> anyhow::Result<()> {
    let state = AppState::with_process_runner(config);
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow!("Please provide a video URL"));
    }
    let summary = handlers::parse_url(&state, url).await?;
    println!("{}", serde_json::to_string_pretty(&ParseResponse::success(summary))?);
    Ok(())
}

fn pick_format<'a>(summary: &'a VideoSummary, format_id: Option<&str>) -> anyhow::Result<&'a NormalizedFormat> {
    let chosen = match format_id {
        Some(id) => summary.formats.iter().find(|f| f.format_id.as_deref() == Some(id)),
        None => summary.formats.iter().find(|f| f.recommended),
    };
    chosen.ok_or_else(|| {
        let available: Vec<String> = summary
            .formats
            .iter()
            .map(|f| format!("{} ({}, {:?})", f.format_id.as_deref().unwrap_or("?"), f.quality, f.download_kind))
            .collect();
        anyhow!("No matching downloadable format. Available: [{}]", available.join(", "))
    })
}

async fn fetch(
    config: &Config,
    server: &str,
    url: &str,
    format_id: Option<&str>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client = ServiceClient::new(server)?;
    let summary = client.parse_video(url).await?;
    let format = pick_format(&summary, format_id)?;
    tracing::info!("Selected {} {} for '{}'", format.quality, format.container, summary.title);

    let request = DownloadRequest::for_format(format, &summary.title, output_dir)?;
    let manager = HttpDownloadManager::new(&config.download_directory)?;

    let (tx, mut rx) = mpsc::channel(32);
    let reporter = tokio::spawn(async move {
        while let Some(state) = rx.recv().await {
            match state {
                DownloadState::Queued => tracing::info!("Download queued"),
                DownloadState::InProgress { received, total: Some(total) } if total > 0 => {
                    tracing::info!("Downloading... {}%", received * 100 / total)
                }
                DownloadState::InProgress { received, .. } => tracing::info!("Downloading... {} bytes", received),
                DownloadState::Complete { path } => tracing::info!("Saved to {}", path.display()),
                DownloadState::Interrupted { reason } => tracing::warn!("Download interrupted: {}", reason),
            }
        }
    });

    let result = manager.download(request, tx).await;
    reporter.await.context("download reporter task failed")?;
    let path = result?;
    println!("{}", path.display());
    Ok(())
}
