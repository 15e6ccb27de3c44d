//! Deterministic, pure logic shared by the relay pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod backoff;
pub mod envelope;
pub mod fallback;
pub mod request;
pub mod types;
