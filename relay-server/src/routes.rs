//! HTTP routes mirroring the platform's local invoke endpoint.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use relay::core::envelope::Envelope;
use relay::runtime::INVALID_EVENT_ERROR;

use crate::state::AppState;

pub const INVOKE_PATH: &str = "/2015-03-31/functions/function/invocations";

/// Build the router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(INVOKE_PATH, post(invoke))
}

async fn health() -> &'static str {
    "ok"
}

/// POST /2015-03-31/functions/function/invocations - run one event, return its envelope.
///
/// The envelope is the function's return value, so it is sent with HTTP 200
/// whatever its own `statusCode` says.
async fn invoke(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Envelope>, (StatusCode, Json<Value>)> {
    let event: Value = serde_json::from_slice(&body).map_err(|err| {
        warn!(err = %err, "rejecting undecodable event");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "errorType": INVALID_EVENT_ERROR,
                "errorMessage": format!("decode invocation event: {err}"),
            })),
        )
    })?;

    let handler = state.handler.clone();
    let envelope = tokio::task::spawn_blocking(move || handler.handle(&event))
        .await
        .map_err(|err| {
            error!(err = %err, "invocation task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "errorType": "Runtime.Unknown",
                    "errorMessage": err.to_string(),
                })),
            )
        })?;
    info!(status_code = envelope.status_code, "invocation handled");
    Ok(Json(envelope))
}
