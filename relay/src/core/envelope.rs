//! Status/body wrapper returned at the request boundary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::types::ResponseRecord;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// `{statusCode, body}` where `body` is itself a JSON document encoded as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl Envelope {
    pub fn ok(record: &ResponseRecord) -> Result<Self> {
        let body = serde_json::to_string(record).context("serialize response record")?;
        Ok(Self {
            status_code: STATUS_OK,
            body,
        })
    }

    pub fn bad_request(message: &str) -> Self {
        Self::error(STATUS_BAD_REQUEST, message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::error(STATUS_INTERNAL_ERROR, message)
    }

    fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: json!({ "error": message }).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Decode the body as a [`ResponseRecord`]. Only meaningful for 200 envelopes.
    pub fn record(&self) -> Result<ResponseRecord> {
        serde_json::from_str(&self.body).context("parse envelope body as response record")
    }

    /// Extract the `error` field of a failure body, if any.
    pub fn error_message(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        value.get("error")?.as_str().map(str::to_string)
    }
}
