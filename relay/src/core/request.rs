//! Invocation event decoding and validation.
//!
//! The task-presence check runs first so a missing task always yields the same
//! error regardless of what else the event carries. Remaining shape checks are
//! delegated to the embedded JSON Schema.

use jsonschema::Draft;
use serde_json::Value;
use thiserror::Error;

use crate::core::types::ExecutionRequest;

const REQUEST_SCHEMA: &str = include_str!("../../schemas/invocation_request.schema.json");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("No task provided")]
    MissingTask,
    #[error("Invalid request: {0}")]
    Invalid(String),
}

/// Decode an invocation event into an [`ExecutionRequest`].
pub fn parse_request(event: &Value) -> Result<ExecutionRequest, RequestError> {
    let task = event
        .get("task")
        .and_then(Value::as_str)
        .filter(|task| !task.is_empty())
        .ok_or(RequestError::MissingTask)?;

    validate_schema(event)?;

    let execute = event
        .get("execute")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(ExecutionRequest {
        task: task.to_string(),
        execute,
    })
}

fn validate_schema(event: &Value) -> Result<(), RequestError> {
    let schema: Value = serde_json::from_str(REQUEST_SCHEMA)
        .map_err(|err| RequestError::Invalid(format!("request schema: {err}")))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| RequestError::Invalid(format!("request schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(event)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(RequestError::Invalid(messages.join("; ")));
    }
    Ok(())
}
