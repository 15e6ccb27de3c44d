//! Stable exit codes for `relay invoke`.

use crate::core::envelope::{STATUS_BAD_REQUEST, STATUS_OK};

/// The invocation returned a 200 envelope.
pub const OK: i32 = 0;
/// The invocation returned a 500 envelope, or the command itself failed.
pub const FAILED: i32 = 1;
/// The invocation was rejected with a 400 envelope.
pub const INVALID_REQUEST: i32 = 2;

/// Map an envelope status code to the process exit code.
pub fn for_status(status_code: u16) -> i32 {
    match status_code {
        STATUS_OK => OK,
        STATUS_BAD_REQUEST => INVALID_REQUEST,
        _ => FAILED,
    }
}
