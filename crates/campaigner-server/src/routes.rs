use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::warn;

use campaigner_dispatch::ConsumerHandle;

pub fn router(intake: ConsumerHandle) -> Router {
    Router::new()
        .route("/triggers", post(submit_trigger))
        .route("/health", get(health))
        .with_state(intake)
}

/// POST /triggers: hand the raw body to the consumer. Decoding happens on
/// the worker, so malformed bodies are still accepted here.
pub async fn submit_trigger(State(intake): State<ConsumerHandle>, body: Bytes) -> StatusCode {
    match intake.submit(body.to_vec()) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            warn!(error = %e, "Trigger refused");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn health() -> &'static str {
    "ok"
}
