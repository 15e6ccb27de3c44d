//! Credential retrieval from a secret store.
//!
//! [`resolve_secret`] wraps any [`SecretStore`] with a bounded retry policy
//! and collapses every failure into `None`; callers treat that as fatal.

use std::thread;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::core::backoff::{backoff_delay, delay_millis};
use crate::io::config::SecretConfig;

/// Header the secrets extension expects the session token in.
pub const TOKEN_HEADER: &str = "X-Aws-Parameters-Secrets-Token";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret request failed: {0}")]
    Transport(String),
    #[error("secret store returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("secret {name} has no string value")]
    Missing { name: String },
    #[error("decode secret response: {0}")]
    Decode(String),
    #[error("environment variable {0} is not set")]
    EnvNotSet(String),
}

/// A source of named secret strings.
pub trait SecretStore {
    fn fetch(&self, name: &str, region: Option<&str>) -> Result<String, SecretError>;
}

impl<T: SecretStore + ?Sized> SecretStore for Box<T> {
    fn fetch(&self, name: &str, region: Option<&str>) -> Result<String, SecretError> {
        (**self).fetch(name, region)
    }
}

pub type BoxedSecretStore = Box<dyn SecretStore + Send + Sync>;

/// Retry settings for secret retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SecretConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Fetch `name`, retrying with backoff. Returns `None` once every attempt has failed.
///
/// `region` falls back to `AWS_REGION` when not given.
#[instrument(skip(store, policy), fields(max_attempts = policy.max_attempts))]
pub fn resolve_secret<S: SecretStore + ?Sized>(
    store: &S,
    name: &str,
    region: Option<&str>,
    policy: &RetryPolicy,
) -> Option<String> {
    let env_region = std::env::var("AWS_REGION").ok();
    let region = region.or(env_region.as_deref());

    for attempt in 0..policy.max_attempts {
        match store.fetch(name, region) {
            Ok(value) if value.is_empty() => {
                // Retrying will not make an empty secret non-empty.
                error!(secret = name, "secret value is empty");
                return None;
            }
            Ok(value) => {
                debug!(secret = name, attempt, "secret resolved");
                return Some(value);
            }
            Err(err) => {
                let remaining = policy.max_attempts - attempt - 1;
                if remaining == 0 {
                    error!(secret = name, err = %err, "error retrieving secret");
                    break;
                }
                let delay = backoff_delay(attempt, policy.initial_backoff, policy.max_backoff);
                warn!(
                    secret = name,
                    err = %err,
                    remaining,
                    delay_ms = delay_millis(delay),
                    "secret retrieval failed, retrying"
                );
                thread::sleep(delay);
            }
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct SecretValueResponse {
    #[serde(rename = "SecretString")]
    secret_string: Option<String>,
}

/// Reads secrets through the platform's local secrets extension endpoint.
#[derive(Debug, Clone)]
pub struct ExtensionSecretStore {
    endpoint: String,
    session_token: Option<String>,
    agent: ureq::Agent,
}

impl ExtensionSecretStore {
    pub fn new(endpoint: &str, session_token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            session_token,
            agent,
        }
    }

    pub fn from_config(config: &SecretConfig) -> Self {
        Self::new(
            &config.extension_endpoint,
            std::env::var("AWS_SESSION_TOKEN").ok(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn url(&self, name: &str) -> String {
        format!(
            "{}/secretsmanager/get?secretId={}",
            self.endpoint,
            urlencoding::encode(name)
        )
    }
}

impl SecretStore for ExtensionSecretStore {
    fn fetch(&self, name: &str, region: Option<&str>) -> Result<String, SecretError> {
        debug!(secret = name, region, endpoint = %self.endpoint, "fetching secret");
        let mut request = self.agent.get(&self.url(name));
        if let Some(token) = &self.session_token {
            request = request.set(TOKEN_HEADER, token);
        }
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(SecretError::Status { status, body });
            }
            Err(err) => return Err(SecretError::Transport(err.to_string())),
        };
        let parsed: SecretValueResponse = response
            .into_json()
            .map_err(|err| SecretError::Decode(err.to_string()))?;
        parsed.secret_string.ok_or_else(|| SecretError::Missing {
            name: name.to_string(),
        })
    }
}

/// Reads the secret from an environment variable, for local runs.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    var: String,
}

impl EnvSecretStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl SecretStore for EnvSecretStore {
    fn fetch(&self, _name: &str, _region: Option<&str>) -> Result<String, SecretError> {
        std::env::var(&self.var).map_err(|_| SecretError::EnvNotSet(self.var.clone()))
    }
}
