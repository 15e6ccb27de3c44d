//! Shared deterministic types for the relay pipeline.
//!
//! These types define the stable contracts between the handler stages and the
//! JSON shapes returned to callers. They carry no I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Decoded invocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task: String,
    #[serde(default)]
    pub execute: bool,
}

/// Output of the assistant, or of the fallback generator standing in for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    /// Empty when the producer wrote nothing to stderr.
    pub stderr: String,
    pub exit_code: i32,
}

/// Outcome of running one generated script.
///
/// The two variants serialize without a tag: a completed run carries its
/// captured streams, a failed one (timeout or launch error) only `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileRun {
    Completed {
        file: String,
        stdout: String,
        stderr: Option<String>,
        return_code: i32,
    },
    Failed {
        file: String,
        error: String,
    },
}

impl FileRun {
    pub fn file(&self) -> &str {
        match self {
            Self::Completed { file, .. } | Self::Failed { file, .. } => file,
        }
    }
}

/// Body of a successful (200) envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub claude_output: String,
    pub claude_error: Option<String>,
    pub return_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_results: Option<Vec<FileRun>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_files: Option<BTreeMap<String, String>>,
}
