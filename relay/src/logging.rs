//! Tracing setup for the relay binaries.
//!
//! Events go to stderr in compact format, which the hosting platform captures
//! as function logs. Stdout stays reserved for command output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; falls back to `default_filter` (e.g. `"info"`) if unset or invalid.
///
/// # Example
/// ```bash
/// RUST_LOG=relay=debug relay invoke --task "hello world"
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
