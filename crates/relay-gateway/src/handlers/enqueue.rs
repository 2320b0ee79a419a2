use crate::handlers::{attributes_from_headers, queue_key};
use crate::state::GatewayState;
use crate::ApiError;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use relay_outbox::QueueKey;
use serde_json::{json, Value};

pub const ENQUEUE_ENDPOINT: &str = "/enqueue";
pub const QUEUE_ENQUEUE_ENDPOINT: &str = "/queues/{queue}/enqueue";

pub async fn enqueue(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let key = state.default_queue.clone();
    enqueue_into(&state, &key, &headers, body).await
}

pub async fn enqueue_queue(
    State(state): State<GatewayState>,
    Path(queue): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let key = queue_key(queue)?;
    enqueue_into(&state, &key, &headers, body).await
}

async fn enqueue_into(
    state: &GatewayState,
    key: &QueueKey,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let id = state
        .manager
        .enqueue(key, body.to_vec(), attributes_from_headers(headers))
        .await?;
    Ok(Json(json!({ "status": "enqueued", "id": id })))
}
