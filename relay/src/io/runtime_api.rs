//! Client for the serverless platform's Runtime API.
//!
//! A custom runtime long-polls `invocation/next` for events and reports each
//! result to `invocation/{id}/response` (or `/error`).

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Environment variable holding the Runtime API `host:port`.
pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";
pub const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
pub const ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";

const API_VERSION: &str = "2018-06-01";

/// One event handed to the function.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub request_id: String,
    /// Raw event body; decoding happens in the runtime loop so bad events can be reported.
    pub body: String,
}

impl Invocation {
    pub fn event(&self) -> Result<Value> {
        serde_json::from_str(&self.body).context("decode invocation event")
    }
}

#[derive(Debug, Serialize)]
struct ErrorRequest<'a> {
    #[serde(rename = "errorMessage")]
    error_message: &'a str,
    #[serde(rename = "errorType")]
    error_type: &'a str,
}

#[derive(Debug, Clone)]
pub struct RuntimeClient {
    base: String,
    agent: ureq::Agent,
}

impl RuntimeClient {
    pub fn new(api_host: &str) -> Self {
        let host = api_host.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        // No timeout: `next` blocks until the platform has an event.
        Self {
            base: format!("{base}/{API_VERSION}/runtime"),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let host = std::env::var(RUNTIME_API_ENV)
            .with_context(|| format!("{RUNTIME_API_ENV} is not set"))?;
        Ok(Self::new(&host))
    }

    /// Block until the next invocation is available.
    pub fn next_invocation(&self) -> Result<Invocation> {
        let url = format!("{}/invocation/next", self.base);
        let response = self
            .agent
            .get(&url)
            .call()
            .context("poll next invocation")?;
        let request_id = response
            .header(REQUEST_ID_HEADER)
            .ok_or_else(|| anyhow!("next invocation missing {REQUEST_ID_HEADER} header"))?
            .to_string();
        let body = response
            .into_string()
            .context("read invocation body")?;
        debug!(request_id, body_len = body.len(), "received invocation");
        Ok(Invocation { request_id, body })
    }

    pub fn post_response<T: Serialize>(&self, request_id: &str, payload: &T) -> Result<()> {
        let url = format!("{}/invocation/{request_id}/response", self.base);
        let payload = serde_json::to_value(payload).context("serialize invocation response")?;
        self.agent
            .post(&url)
            .send_json(payload)
            .with_context(|| format!("post response for {request_id}"))?;
        Ok(())
    }

    pub fn post_error(&self, request_id: &str, error_type: &str, message: &str) -> Result<()> {
        let url = format!("{}/invocation/{request_id}/error", self.base);
        self.send_error(&url, error_type, message)
            .with_context(|| format!("post error for {request_id}"))
    }

    /// Report a failure that happened before the first invocation could be served.
    pub fn post_init_error(&self, error_type: &str, message: &str) -> Result<()> {
        let url = format!("{}/init/error", self.base);
        self.send_error(&url, error_type, message)
            .context("post init error")
    }

    fn send_error(&self, url: &str, error_type: &str, message: &str) -> Result<()> {
        let body = serde_json::to_value(ErrorRequest {
            error_message: message,
            error_type,
        })
        .context("serialize error body")?;
        self.agent
            .post(url)
            .set(ERROR_TYPE_HEADER, "Unhandled")
            .send_json(body)?;
        Ok(())
    }
}
