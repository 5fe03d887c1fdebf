use anyhow::{anyhow, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// The structure of our configuration file (config.toml)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Executable name or path of the extraction tool.
    pub extraction_tool_path: String,
    /// Browser whose cookies are attached on the access-denied retry.
    /// Unset disables the retry.
    pub retry_credential_profile: Option<String>,
    pub subprocess_timeout_secs: u64,
    /// Where `fetch` saves files.
    pub download_directory: String,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        // Use the 'directories' crate to find the user's download directory.
        // This works on Windows, macOS, and Linux.
        let default_dir = UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|p| p.to_string_lossy().to_string()))
            .unwrap_or_else(|| "downloads".to_string()); // Fallback

        Config {
            extraction_tool_path: "yt-dlp".to_string(),
            retry_credential_profile: Some("chrome".to_string()),
            subprocess_timeout_secs: DEFAULT_TIMEOUT_SECS,
            download_directory: default_dir,
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// A zero timeout would fail every request, so it falls back to the default.
    pub fn subprocess_timeout(&self) -> Duration {
        match self.subprocess_timeout_secs {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Empty profile names in the file mean "no retry".
    pub fn retry_profile(&self) -> Option<&str> {
        self.retry_credential_profile.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `HOST` and `PORT` from the environment win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::var("HOST").ok(), std::env::var("PORT").ok());
    }

    fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) {
        if let Some(host) = host.filter(|h| !h.is_empty()) {
            self.host = host;
        }
        if let Some(port) = port {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value '{}'", port),
            }
        }
    }
}

pub(crate) fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "YtParse", "yt-parse-agent")
        .ok_or_else(|| anyhow!("Could not find a valid home directory to store config"))
}

/// Returns the cross-platform path to the configuration file, creating the directory if needed.
async fn default_config_path() -> Result<PathBuf> {
    let project_dirs = project_dirs()?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir).await?;
    Ok(config_dir.join("config.toml"))
}

/// Loads the configuration from `path` (or the default location), creating a
/// default file if none exists.
pub async fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().await?,
    };

    if !config_path.exists() {
        tracing::info!(
            "No config file found. Creating a default one at: {}",
            config_path.display()
        );
        let default_config = Config::default();
        save_config(&default_config, &config_path).await?;
        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path).await?;
    let config: Config = toml::from_str(&config_content)
        .map_err(|e| anyhow!("Failed to parse config file at {}: {}", config_path.display(), e))?;

    Ok(config)
}

/// Saves the provided configuration object to `path`.
pub async fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let toml_string = toml::to_string_pretty(config)?;
    fs::write(path, toml_string).await?;
    Ok(())
}
