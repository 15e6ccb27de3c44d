//! Side-effecting operations: filesystem, child processes, HTTP.

pub mod assistant;
pub mod collect;
pub mod config;
pub mod fallback;
pub mod process;
pub mod runtime_api;
pub mod scripts;
pub mod secrets;
pub mod workspace;
