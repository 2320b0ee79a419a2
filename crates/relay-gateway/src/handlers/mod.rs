pub mod drain;
pub mod drain_all;
pub mod enqueue;
pub mod health;
pub mod line_webhook;
pub mod status;

use crate::ApiError;
use axum::http::HeaderMap;
use relay_outbox::{Attributes, QueueKey, ATTR_SIGNATURE, ATTR_THINKING_METHOD, ATTR_THINKING_SENT};

/// Request headers copied onto queued events.
pub const FORWARDED_HEADERS: [&str; 3] = [ATTR_SIGNATURE, ATTR_THINKING_SENT, ATTR_THINKING_METHOD];

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Collect the forwarded headers present on a request.
pub(crate) fn attributes_from_headers(headers: &HeaderMap) -> Attributes {
    FORWARDED_HEADERS
        .iter()
        .filter_map(|name| header_str(headers, name).map(|value| (name.to_string(), value.to_string())))
        .collect()
}

pub(crate) fn queue_key(raw: String) -> Result<QueueKey, ApiError> {
    QueueKey::new(raw.clone()).map_err(|_| ApiError::InvalidQueue(raw))
}
