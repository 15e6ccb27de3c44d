//! Custom-runtime event loop: poll, handle, report, repeat.

use anyhow::Result;
use tracing::{error, info, info_span, warn};

use crate::handler::EventHandler;
use crate::io::runtime_api::{Invocation, RuntimeClient};

pub const INVALID_EVENT_ERROR: &str = "InvalidEvent";

/// Handle one invocation and report its result to the Runtime API.
pub fn serve_one<H: EventHandler + ?Sized>(
    client: &RuntimeClient,
    handler: &H,
    invocation: &Invocation,
) -> Result<()> {
    let _span = info_span!("invocation", request_id = %invocation.request_id).entered();
    match invocation.event() {
        Ok(event) => {
            let envelope = handler.handle(&event);
            info!(status_code = envelope.status_code, "invocation handled");
            client.post_response(&invocation.request_id, &envelope)
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(err = %message, "undecodable invocation event");
            client.post_error(&invocation.request_id, INVALID_EVENT_ERROR, &message)
        }
    }
}

/// Serve invocations until polling fails. Reporting failures are logged and skipped.
pub fn run_loop<H: EventHandler + ?Sized>(client: &RuntimeClient, handler: &H) -> Result<()> {
    info!("runtime loop started");
    loop {
        let invocation = client.next_invocation()?;
        if let Err(err) = serve_one(client, handler, &invocation) {
            let message = format!("{err:#}");
            error!(
                request_id = %invocation.request_id,
                err = %message,
                "failed to report invocation result"
            );
        }
    }
}
