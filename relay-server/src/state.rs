//! Shared application state for the invoke server.

use std::sync::Arc;

use relay::handler::EventHandler;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handles one invocation event; blocking, so routes run it off the async workers.
    pub handler: Arc<dyn EventHandler>,
}

impl AppState {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }
}
