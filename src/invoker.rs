//! Runs the external extraction tool and collects its buffered output.
//!
//! Each call spawns one child process. The child is killed if the timeout
//! elapses or the calling future is dropped (e.g. the HTTP client hung up).

use crate::config::Config;
use crate::error::ExtractionError;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
pub const REFERER: &str = "https://www.youtube.com";
pub const ACCEPT_LANGUAGE: &str = "Accept-Language: zh-CN,zh;q=0.9";
pub const PLAYER_CLIENT: &str = "youtube:player_client=android";

/// Everything a finished child process left behind.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Seam between the invoker and the OS process table.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs `program` to completion. Only launch failures and timeouts are
    /// errors here; a non-zero exit is reported through [`ToolOutput`].
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ToolOutput, ExtractionError>;
}

/// [`ToolRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ToolOutput, ExtractionError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractionError::Launch { program: program.to_string(), source })?;

        // On timeout the `wait_with_output` future is dropped, which drops the
        // child and kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(ExtractionError::Launch { program: program.to_string(), source }),
            Err(_) => return Err(ExtractionError::Timeout { after: timeout }),
        };

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }
}

/// Builds the argument vector for one metadata extraction.
///
/// `credential_profile` is the browser whose cookies are attached; the URL is
/// always the last argument.
pub fn build_args(url: &str, credential_profile: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = [
        "--dump-json",
        "--no-playlist",
        "--no-warnings",
        "--ignore-config",
        "--geo-bypass",
        "--force-ipv4",
        "--no-check-certificate",
        "--user-agent",
        USER_AGENT,
        "--referer",
        REFERER,
        "--add-header",
        ACCEPT_LANGUAGE,
        "--extractor-args",
        PLAYER_CLIENT,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(profile) = credential_profile {
        args.push("--cookies-from-browser".to_string());
        args.push(profile.to_string());
    }
    args.push(url.to_string());
    args
}

/// Configured handle on the extraction tool.
#[derive(Clone)]
pub struct Extractor {
    program: String,
    timeout: Duration,
    runner: Arc<dyn ToolRunner>,
}

impl Extractor {
    pub fn new(config: &Config, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            program: config.extraction_tool_path.clone(),
            timeout: config.subprocess_timeout(),
            runner,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// One metadata extraction. Returns the raw JSON text on exit code 0
    /// with non-empty stdout.
    /// Runs with cookies attached (the retry attempt) when `credential_profile` is set.
    pub async fn dump_json(
        &self,
        url: &str,
        credential_profile: Option<&str>,
    ) -> Result<String, ExtractionError> {
        let attempt = if credential_profile.is_some() { "retry" } else { "primary" };
        let args = build_args(url, credential_profile);
        tracing::debug!(program = %self.program, attempt, "Running extraction for {}", url);

        let output = match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(program = %self.program, attempt, outcome = err.kind(), "{}", err);
                return Err(err);
            }
        };

        if output.success() && !output.stdout.trim().is_empty() {
            tracing::info!(
                program = %self.program,
                attempt,
                exit_code = ?output.exit_code,
                outcome = "ok",
                "Extraction finished for {}",
                url
            );
            return Ok(output.stdout);
        }
        tracing::warn!(
            program = %self.program,
            attempt,
            exit_code = ?output.exit_code,
            outcome = "extraction_failed",
            "Extraction failed for {}",
            url
        );

        let stderr = if output.stderr.trim().is_empty() && output.success() {
            "extraction tool produced no output".to_string()
        } else {
            output.stderr
        };
        Err(ExtractionError::Execution { exit_code: output.exit_code, stderr })
    }

    /// Runs the tool's `--version` query.
    pub async fn tool_version(&self) -> Result<String, ExtractionError> {
        let output = self.runner.run(&self.program, &["--version".to_string()], self.timeout).await?;
        if output.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(ExtractionError::Execution { exit_code: output.exit_code, stderr: output.stderr })
        }
    }
}
