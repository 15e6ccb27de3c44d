//! Relay configuration: defaults, optional TOML file, environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";

/// Relay configuration (TOML).
///
/// Missing fields default to the reference deployment values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub secret: SecretConfig,
    pub assistant: AssistantConfig,
    pub scripts: ScriptConfig,
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    /// The platform's local secrets extension endpoint.
    Extension,
    /// A plain environment variable (`secret.env_var`).
    Env,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecretConfig {
    /// Secret id holding the assistant API key.
    pub name: String,
    /// Region override; `AWS_REGION` is used when unset.
    pub region: Option<String>,
    pub source: SecretSource,
    /// Variable read when `source = "env"`.
    pub env_var: String,
    pub extension_endpoint: String,
    /// Per-attempt request timeout.
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            name: "anthropic-api-key-secret".to_string(),
            region: None,
            source: SecretSource::Extension,
            env_var: "ANTHROPIC_API_KEY".to_string(),
            extension_endpoint: "http://localhost:2773".to_string(),
            request_timeout_secs: 5,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssistantConfig {
    /// Assistant executable, resolved through `PATH`.
    pub binary: String,
    /// Flags for non-interactive, permission-skipping, plain-text output.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes each.
    pub output_limit_bytes: usize,
    /// Variable the credential is exported as in the child environment.
    pub credential_env: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            args: vec![
                "--dangerously-skip-permissions".to_string(),
                "--print".to_string(),
            ],
            timeout_secs: 300,
            output_limit_bytes: 1_000_000,
            credential_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptConfig {
    pub interpreter: String,
    /// Extensions (without dot) of files the executor runs.
    pub extensions: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            extensions: vec!["py".to_string()],
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for per-request workspaces; the system temp dir when unset.
    pub root: Option<PathBuf>,
    /// Extensions (without dot) of files returned as `created_files`.
    pub collect_extensions: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            collect_extensions: vec!["py".to_string(), "js".to_string(), "txt".to_string()],
        }
    }
}

impl WorkspaceConfig {
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.secret.name.trim().is_empty() {
            return Err(anyhow!("secret.name must be non-empty"));
        }
        if self.secret.source == SecretSource::Env && self.secret.env_var.trim().is_empty() {
            return Err(anyhow!("secret.env_var must be non-empty when source = \"env\""));
        }
        if self.secret.request_timeout_secs == 0 {
            return Err(anyhow!("secret.request_timeout_secs must be > 0"));
        }
        if self.secret.max_attempts == 0 {
            return Err(anyhow!("secret.max_attempts must be > 0"));
        }
        if self.secret.initial_backoff_ms > self.secret.max_backoff_ms {
            return Err(anyhow!(
                "secret.initial_backoff_ms must be <= secret.max_backoff_ms"
            ));
        }
        if self.assistant.binary.trim().is_empty() {
            return Err(anyhow!("assistant.binary must be non-empty"));
        }
        if self.assistant.credential_env.trim().is_empty() {
            return Err(anyhow!("assistant.credential_env must be non-empty"));
        }
        if self.assistant.timeout_secs == 0 {
            return Err(anyhow!("assistant.timeout_secs must be > 0"));
        }
        if self.assistant.output_limit_bytes == 0 {
            return Err(anyhow!("assistant.output_limit_bytes must be > 0"));
        }
        if self.scripts.interpreter.trim().is_empty() {
            return Err(anyhow!("scripts.interpreter must be non-empty"));
        }
        if self.scripts.timeout_secs == 0 {
            return Err(anyhow!("scripts.timeout_secs must be > 0"));
        }
        if self.scripts.output_limit_bytes == 0 {
            return Err(anyhow!("scripts.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Apply `RELAY_*` overrides. `lookup` is normally `std::env::var`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("RELAY_SECRET_NAME") {
            self.secret.name = name;
        }
        if let Some(source) = lookup("RELAY_SECRET_SOURCE") {
            self.secret.source = match source.trim().to_ascii_lowercase().as_str() {
                "extension" => SecretSource::Extension,
                "env" => SecretSource::Env,
                other => return Err(anyhow!("RELAY_SECRET_SOURCE: unknown source {other:?}")),
            };
        }
        if let Some(binary) = lookup("RELAY_ASSISTANT_BINARY") {
            self.assistant.binary = binary;
        }
        if let Some(timeout) = lookup("RELAY_ASSISTANT_TIMEOUT_SECS") {
            self.assistant.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("RELAY_ASSISTANT_TIMEOUT_SECS: {timeout:?}"))?;
        }
        if let Some(interpreter) = lookup("RELAY_SCRIPT_INTERPRETER") {
            self.scripts.interpreter = interpreter;
        }
        if let Some(root) = lookup("RELAY_WORKSPACE_ROOT") {
            self.workspace.root = Some(PathBuf::from(root));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RelayConfig::default()`.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    if !path.exists() {
        let cfg = RelayConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RelayConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve the effective config: `RELAY_CONFIG` file (if any) plus env overrides.
pub fn load_from_env() -> Result<RelayConfig> {
    load_with(|key| std::env::var(key).ok())
}

pub fn load_with<F>(lookup: F) -> Result<RelayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match lookup(CONFIG_PATH_ENV) {
        Some(path) => load_config(Path::new(&path))?,
        None => RelayConfig::default(),
    };
    cfg.apply_env_overrides(&lookup)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn render_config(cfg: &RelayConfig) -> Result<String> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    Ok(buf)
}
