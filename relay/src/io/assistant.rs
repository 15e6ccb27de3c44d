//! Assistant abstraction and the `claude` CLI backend.
//!
//! The [`Assistant`] trait decouples the handler from the actual CLI. Tests
//! use scripted assistants that return predetermined results without spawning
//! processes.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::types::ExecutionResult;
use crate::io::config::AssistantConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::workspace::{HOME_MODE, set_mode};

/// Auth file written at the root of the assistant home.
pub const AUTH_FILE: &str = ".claude.json";
/// Settings directory and file inside the assistant home.
pub const SETTINGS_DIR: &str = ".claude";
pub const SETTINGS_FILE: &str = "settings.json";

const STDERR_LOG_PREFIX_CHARS: usize = 200;

/// Parameters for one assistant invocation.
#[derive(Debug, Clone)]
pub struct AssistantRequest<'a> {
    pub task: &'a str,
    /// Working directory; generated files land here.
    pub workdir: &'a Path,
    /// Private home directory for credential files.
    pub home: &'a Path,
    pub api_key: &'a str,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Claude CLI execution timeout after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("prepare assistant home: {0:#}")]
    Setup(anyhow::Error),
    #[error("Claude CLI process error: {0:#}")]
    Process(anyhow::Error),
}

/// Abstraction over assistant backends.
pub trait Assistant {
    /// Run the assistant. A non-zero exit code is still `Ok`; only timeouts and
    /// launch failures are errors.
    fn invoke(&self, request: &AssistantRequest<'_>) -> Result<ExecutionResult, AssistantError>;
}

/// Runs the `claude` CLI with the task on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    binary: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    credential_env: String,
}

impl ClaudeCli {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            credential_env: config.credential_env.clone(),
        }
    }

    fn command(&self, request: &AssistantRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .current_dir(request.workdir)
            .env_clear()
            .env("HOME", request.home)
            .env("CI", "true")
            .env("TERM", "dumb")
            .env("NO_COLOR", "1")
            .env(&self.credential_env, request.api_key);
        for var in ["PATH", "AWS_REGION"] {
            if let Some(value) = std::env::var_os(var) {
                cmd.env(var, value);
            }
        }
        cmd
    }
}

impl Assistant for ClaudeCli {
    #[instrument(skip_all, fields(binary = %self.binary, timeout_secs = self.timeout.as_secs()))]
    fn invoke(&self, request: &AssistantRequest<'_>) -> Result<ExecutionResult, AssistantError> {
        info!(workdir = %request.workdir.display(), task_len = request.task.len(), "starting assistant");

        write_credentials(request.home, request.api_key).map_err(AssistantError::Setup)?;

        let output = run_command_with_timeout(
            self.command(request),
            Some(request.task.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(AssistantError::Process)?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "assistant timed out");
            return Err(AssistantError::Timeout(self.timeout));
        }

        let result = ExecutionResult {
            stdout: output.stdout_text("assistant"),
            stderr: output.stderr_text("assistant"),
            exit_code: output.exit_code(),
        };
        info!(
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            "assistant completed"
        );
        if !result.stderr.is_empty() {
            let prefix: String = result.stderr.chars().take(STDERR_LOG_PREFIX_CHARS).collect();
            warn!(stderr = %prefix, "assistant wrote to stderr");
        }
        Ok(result)
    }
}

/// Write the auth and settings files the CLI reads its API key from.
pub fn write_credentials(home: &Path, api_key: &str) -> Result<()> {
    let settings_dir = home.join(SETTINGS_DIR);
    fs::create_dir_all(&settings_dir)
        .with_context(|| format!("create settings dir {}", settings_dir.display()))?;

    let payload = json!({ "apiKey": api_key }).to_string();
    let auth_path = home.join(AUTH_FILE);
    fs::write(&auth_path, &payload).with_context(|| format!("write {}", auth_path.display()))?;
    let settings_path = settings_dir.join(SETTINGS_FILE);
    fs::write(&settings_path, &payload)
        .with_context(|| format!("write {}", settings_path.display()))?;

    set_mode(home, HOME_MODE)?;
    set_mode(&settings_dir, HOME_MODE)?;
    Ok(())
}
