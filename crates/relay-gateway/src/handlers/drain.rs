use crate::handlers::queue_key;
use crate::state::GatewayState;
use crate::ApiError;
use axum::extract::{Path, State};
use axum::Json;
use relay_outbox::QueueKey;
use serde_json::{json, Value};
use tracing::debug;

pub const DRAIN_ENDPOINT: &str = "/drain";
pub const QUEUE_DRAIN_ENDPOINT: &str = "/queues/{queue}/drain";

/// Run one drain pass on the default queue and wait for it.
pub async fn drain(State(state): State<GatewayState>) -> Result<Json<Value>, ApiError> {
    let key = state.default_queue.clone();
    drain_queue_inner(&state, &key).await
}

pub async fn drain_queue(
    State(state): State<GatewayState>,
    Path(queue): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let key = queue_key(queue)?;
    drain_queue_inner(&state, &key).await
}

async fn drain_queue_inner(state: &GatewayState, key: &QueueKey) -> Result<Json<Value>, ApiError> {
    let report = state.manager.drain(key).await?;
    debug!(queue = %key, report = ?report, "Drain requested over HTTP");
    Ok(Json(json!({ "status": "drain_triggered" })))
}
