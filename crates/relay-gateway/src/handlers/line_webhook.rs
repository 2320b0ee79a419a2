use crate::handlers::header_str;
use crate::state::GatewayState;
use crate::{signature, FilterOutcome, ThinkingMethod};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use relay_outbox::{Attributes, ATTR_SIGNATURE, ATTR_THINKING_METHOD, ATTR_THINKING_SENT};
use tracing::{error, info, warn};

pub const LINE_WEBHOOK_ENDPOINT: &str = "/line-webhook";

/// Inbound LINE webhook: verify, filter, acknowledge, then queue.
pub async fn line_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = header_str(&headers, ATTR_SIGNATURE).unwrap_or("").to_string();

    match state.webhook.channel_secret.as_deref() {
        Some(secret) => {
            if !signature::verify(secret, &body, &signature) {
                warn!("Webhook signature check failed");
                return (StatusCode::FORBIDDEN, "invalid signature").into_response();
            }
        }
        None => warn!("No channel secret configured; skipping signature check"),
    }

    let body = match state.webhook.filter.apply(&body) {
        FilterOutcome::Forward(body) => body,
        FilterOutcome::Drop => {
            info!("All webhook events filtered, nothing to queue");
            return (StatusCode::OK, "ok").into_response();
        }
    };

    let thinking = match &state.webhook.notifier {
        Some(notifier) => notifier.notify(&body).await,
        None => ThinkingMethod::None,
    };

    let mut attributes = Attributes::new();
    attributes.insert(ATTR_SIGNATURE.to_string(), signature);
    attributes.insert(ATTR_THINKING_SENT.to_string(), thinking.sent_flag().to_string());
    attributes.insert(ATTR_THINKING_METHOD.to_string(), thinking.as_str().to_string());

    match state
        .manager
        .enqueue(&state.default_queue, body, attributes)
        .await
    {
        Ok(id) => {
            info!(event_id = %id, thinking = thinking.as_str(), "Webhook queued");
            (StatusCode::OK, "ok").into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to queue webhook");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage error").into_response()
        }
    }
}
