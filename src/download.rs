//! Handoff of a chosen rendition to a download manager.
//!
//! The normalization core's job ends once a direct URL and a safe file name
//! are produced; a [`DownloadManager`] owns the transfer and reports its
//! lifecycle over a channel.

use crate::models::{DownloadKind, NormalizedFormat};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

pub const MAX_STEM_CHARS: usize = 100;
const DEFAULT_EXTENSION: &str = "mp4";

static ILLEGAL_CHARS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static regex is valid"));
static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex is valid"));

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("'{0}' formats cannot be saved as a single file, pick a direct format")]
    UnsupportedKind(&'static str),

    #[error("format has no media URL")]
    MissingUrl,

    #[error("download request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("media host responded with HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("could not write download: {0}")]
    Io(#[from] std::io::Error),

    #[error("download interrupted: {0}")]
    Interrupted(String),
}

/// File name safe on every mainstream filesystem: illegal characters become
/// `_`, whitespace runs collapse to `_`, and the stem is capped at
/// [`MAX_STEM_CHARS`] characters.
pub fn sanitize_filename(title: &str, extension: &str) -> String {
    let cleaned = ILLEGAL_CHARS_REGEX.replace_all(title.trim(), "_");
    let cleaned = WHITESPACE_REGEX.replace_all(&cleaned, "_");
    let stem: String = cleaned.chars().filter(|c| !c.is_control()).take(MAX_STEM_CHARS).collect();
    let stem = if stem.is_empty() { "video".to_string() } else { stem };

    let extension = extension.trim().trim_start_matches('.').to_lowercase();
    let extension = if extension.is_empty() { DEFAULT_EXTENSION.to_string() } else { extension };
    format!("{}.{}", stem, extension)
}

/// What a download manager is asked to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    /// Custom target directory; the manager's default when `None`.
    pub directory: Option<PathBuf>,
}

impl DownloadRequest {
    /// Builds the handoff for a chosen format. Only direct formats qualify.
    pub fn for_format(
        format: &NormalizedFormat,
        title: &str,
        directory: Option<PathBuf>,
    ) -> Result<Self, DownloadError> {
        if format.download_kind == DownloadKind::Stream {
            return Err(DownloadError::UnsupportedKind("stream"));
        }
        let url = format.url.clone().filter(|u| !u.is_empty()).ok_or(DownloadError::MissingUrl)?;
        Ok(Self { url, filename: sanitize_filename(title, &format.container), directory })
    }
}

/// Lifecycle transitions reported by a [`DownloadManager`].
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    Queued,
    InProgress { received: u64, total: Option<u64> },
    Complete { path: PathBuf },
    Interrupted { reason: String },
}

#[async_trait]
pub trait DownloadManager: Send + Sync {
    /// Fetches and saves `request`, sending lifecycle events on `events`.
    /// Returns the saved path.
    async fn download(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadState>,
    ) -> Result<PathBuf, DownloadError>;
}

/// Streams the media URL straight into a file.
pub struct HttpDownloadManager {
    client: reqwest::Client,
    default_directory: PathBuf,
}

impl HttpDownloadManager {
    pub fn new(default_directory: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::invoker::USER_AGENT)
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, default_directory: default_directory.into() })
    }

    async fn transfer(
        &self,
        request: &DownloadRequest,
        events: &mpsc::Sender<DownloadState>,
    ) -> Result<PathBuf, DownloadError> {
        let directory = request.directory.clone().unwrap_or_else(|| self.default_directory.clone());
        tokio::fs::create_dir_all(&directory).await?;
        let path = unique_path(&directory, &request.filename).await;

        let response = self.client.get(&request.url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        let file = tokio::fs::File::create(&path).await?;
        // No partial file is left behind, whatever went wrong.
        match write_body(file, response, events).await {
            Ok(()) => Ok(path),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }
}

async fn write_body(
    mut file: tokio::fs::File,
    response: reqwest::Response,
    events: &mpsc::Sender<DownloadState>,
) -> Result<(), DownloadError> {
    let total = response.content_length();
    let mut received: u64 = 0;
    let mut last_reported_percent = 0u64;
    let _ = events.send(DownloadState::InProgress { received, total }).await;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Interrupted(e.to_string()))?;
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;

        let percent = total.filter(|t| *t > 0).map_or(0, |t| received * 100 / t);
        if percent >= last_reported_percent + 5 {
            last_reported_percent = percent;
            let _ = events.send(DownloadState::InProgress { received, total }).await;
        }
    }
    file.flush().await?;

    if let Some(total) = total.filter(|t| received < *t) {
        return Err(DownloadError::Interrupted(format!("received {} of {} bytes", received, total)));
    }
    Ok(())
}

#[async_trait]
impl DownloadManager for HttpDownloadManager {
    async fn download(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadState>,
    ) -> Result<PathBuf, DownloadError> {
        let _ = events.send(DownloadState::Queued).await;
        tracing::info!("Downloading {} as {}", request.url, request.filename);

        match self.transfer(&request, &events).await {
            Ok(path) => {
                tracing::info!("Download complete: {}", path.display());
                let _ = events.send(DownloadState::Complete { path: path.clone() }).await;
                Ok(path)
            }
            Err(e) => {
                tracing::error!("Download of {} failed: {}", request.filename, e);
                let _ = events.send(DownloadState::Interrupted { reason: e.to_string() }).await;
                Err(e)
            }
        }
    }
}

/// `dir/name.ext`, or `dir/name (n).ext` for the first free `n`.
async fn unique_path(directory: &Path, filename: &str) -> PathBuf {
    let candidate = directory.join(filename);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (filename, String::new()),
    };
    let mut n = 1;
    loop {
        let candidate = directory.join(format!("{} ({}){}", stem, n, ext));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}
