//! Task relay: hands a natural-language task to a command-line assistant and
//! returns what it produced.
//!
//! One invocation runs strictly in sequence: fetch the API key, run the
//! assistant in a private workspace (falling back to a canned script when it
//! cannot run), optionally execute the generated scripts, read the generated
//! files back, and remove the workspace.
//!
//! - **[`core`]**: Pure, deterministic logic (request validation, fallback
//!   planning, envelopes, backoff). No I/O.
//! - **[`io`]**: Side-effecting operations (secrets, processes, filesystem,
//!   Runtime API).
//!
//! [`handler`] composes the two into the request pipeline; [`runtime`] feeds
//! it events from the hosting platform.

pub mod core;
pub mod exit_codes;
pub mod handler;
pub mod io;
pub mod logging;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
