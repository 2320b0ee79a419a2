use crate::handlers::queue_key;
use crate::state::GatewayState;
use crate::ApiError;
use axum::extract::{Path, State};
use axum::Json;
use relay_outbox::QueueKey;
use serde_json::{json, Value};

pub const STATUS_ENDPOINT: &str = "/status";
pub const QUEUE_STATUS_ENDPOINT: &str = "/queues/{queue}/status";

pub async fn status(State(state): State<GatewayState>) -> Result<Json<Value>, ApiError> {
    let key = state.default_queue.clone();
    status_of(&state, &key).await
}

pub async fn queue_status(
    State(state): State<GatewayState>,
    Path(queue): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let key = queue_key(queue)?;
    status_of(&state, &key).await
}

async fn status_of(state: &GatewayState, key: &QueueKey) -> Result<Json<Value>, ApiError> {
    let status = state.manager.status(key).await?;
    Ok(Json(json!({
        "queue_len": status.queue_length,
        "head": status.head,
        "next_wake_at": status.next_wake_at,
    })))
}
