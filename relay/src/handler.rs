//! Orchestration for a single invocation.
//!
//! ```text
//! validate → workspace → secret → assistant (or fallback)
//!          → scripts (opt-in) → collect files → remove workspace → envelope
//! ```
//!
//! [`Handler::handle`] never fails: validation problems become 400 envelopes
//! and everything past validation that goes wrong becomes a 500 envelope.

use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::core::envelope::Envelope;
use crate::core::request::parse_request;
use crate::core::types::{ExecutionRequest, ResponseRecord};
use crate::io::assistant::{Assistant, AssistantRequest, ClaudeCli};
use crate::io::collect::collect_files;
use crate::io::config::{RelayConfig, SecretSource};
use crate::io::fallback::write_fallback;
use crate::io::scripts::ScriptRunner;
use crate::io::secrets::{
    BoxedSecretStore, EnvSecretStore, ExtensionSecretStore, RetryPolicy, SecretStore,
    resolve_secret,
};
use crate::io::workspace::Workspace;

/// Anything that turns an invocation event into an envelope.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Value) -> Envelope;
}

/// The production handler type built from configuration.
pub type DefaultHandler = Handler<BoxedSecretStore, ClaudeCli>;

/// Request handler wired to a secret store and an assistant backend.
pub struct Handler<S, A> {
    config: RelayConfig,
    secrets: S,
    assistant: A,
    scripts: ScriptRunner,
}

impl<S: SecretStore, A: Assistant> Handler<S, A> {
    pub fn new(config: RelayConfig, secrets: S, assistant: A) -> Self {
        let scripts = ScriptRunner::new(&config.scripts);
        Self {
            config,
            secrets,
            assistant,
            scripts,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn secrets(&self) -> &S {
        &self.secrets
    }

    pub fn assistant(&self) -> &A {
        &self.assistant
    }

    /// Handle one event. Never panics outward and never returns an error.
    pub fn handle_event(&self, event: &Value) -> Envelope {
        let request = match parse_request(event) {
            Ok(request) => request,
            Err(err) => {
                warn!(err = %err, "rejecting invocation");
                return Envelope::bad_request(&err.to_string());
            }
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| self.process(&request)))
            .unwrap_or_else(|_| Err(anyhow!("handler panicked")));
        let envelope = outcome.and_then(|record| Envelope::ok(&record));
        match envelope {
            Ok(envelope) => envelope,
            Err(err) => {
                let message = format!("{err:#}");
                error!(err = %message, "invocation failed");
                Envelope::internal_error(&format!("Lambda function error: {message}"))
            }
        }
    }

    /// Run the pipeline inside a fresh workspace, removing it afterward whatever happened.
    #[instrument(skip_all, fields(task_len = request.task.len(), execute = request.execute))]
    fn process(&self, request: &ExecutionRequest) -> Result<ResponseRecord> {
        let workspace = Workspace::create(&self.config.workspace.root_dir())?;
        info!(workspace = workspace.name(), "workspace ready");

        let result = self.process_in(request, &workspace);

        if let Err(err) = workspace.remove() {
            let message = format!("{err:#}");
            warn!(err = %message, "failed to clean up workspace");
        }
        result
    }

    fn process_in(&self, request: &ExecutionRequest, workspace: &Workspace) -> Result<ResponseRecord> {
        let secret = &self.config.secret;
        let api_key = resolve_secret(
            &self.secrets,
            &secret.name,
            secret.region.as_deref(),
            &RetryPolicy::from_config(secret),
        )
        .ok_or_else(|| {
            anyhow!(
                "Failed to retrieve {} from secrets manager",
                self.config.assistant.credential_env
            )
        })?;

        let invocation = AssistantRequest {
            task: &request.task,
            workdir: workspace.scratch(),
            home: workspace.home(),
            api_key: &api_key,
        };
        let mut record = match self.assistant.invoke(&invocation) {
            Ok(result) => ResponseRecord {
                claude_output: result.stdout,
                claude_error: (!result.stderr.is_empty()).then_some(result.stderr),
                return_code: result.exit_code,
                execution_results: None,
                execution_error: None,
                created_files: None,
            },
            Err(err) => {
                warn!(err = %err, "assistant failed, using fallback");
                let fallback = write_fallback(&request.task, workspace.scratch())?;
                ResponseRecord {
                    claude_output: fallback.stdout,
                    claude_error: Some(format!("Claude CLI Error: {err}")),
                    return_code: fallback.exit_code,
                    execution_results: None,
                    execution_error: None,
                    created_files: None,
                }
            }
        };

        if request.execute && record.return_code == 0 {
            match self.scripts.run_all(workspace.scratch()) {
                Ok(results) => record.execution_results = Some(results),
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(err = %message, "error executing files");
                    record.execution_error = Some(message);
                }
            }
        } else if request.execute {
            info!(return_code = record.return_code, "skipping execution after non-zero exit");
        }

        match collect_files(
            workspace.scratch(),
            &self.config.workspace.collect_extensions,
        ) {
            Ok(files) => record.created_files = Some(files),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(err = %message, "failed to read created files");
            }
        }

        Ok(record)
    }
}

impl<S, A> EventHandler for Handler<S, A>
where
    S: SecretStore + Send + Sync,
    A: Assistant + Send + Sync,
{
    fn handle(&self, event: &Value) -> Envelope {
        self.handle_event(event)
    }
}

/// Build the production handler: configured secret source plus the `claude` CLI.
pub fn build_handler(config: RelayConfig) -> DefaultHandler {
    let secrets: BoxedSecretStore = match config.secret.source {
        SecretSource::Extension => Box::new(ExtensionSecretStore::from_config(&config.secret)),
        SecretSource::Env => Box::new(EnvSecretStore::new(config.secret.env_var.clone())),
    };
    let assistant = ClaudeCli::new(&config.assistant);
    Handler::new(config, secrets, assistant)
}
