//! Drops webhook events whose text message is a blocked keyword.

use serde_json::Value;
use tracing::debug;

/// What to do with a webhook body after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Forward this body. It is the original bytes unless some events were
    /// removed.
    Forward(Vec<u8>),
    /// Every event was filtered out; acknowledge without forwarding.
    Drop,
}

/// Keyword filter for text message events.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a message text (compared trimmed) is a blocked keyword.
    pub fn is_blocked(&self, text: &str) -> bool {
        let text = text.trim();
        self.keywords.iter().any(|keyword| keyword == text)
    }

    /// Whether a single webhook event should be dropped.
    pub fn blocks_event(&self, event: &Value) -> bool {
        let Some(message) = event.get("message") else {
            return false;
        };
        if message.get("type").and_then(Value::as_str) != Some("text") {
            return false;
        }
        let text = message.get("text").and_then(Value::as_str).unwrap_or("");
        self.is_blocked(text)
    }

    /// Filter a webhook body.
    ///
    /// Bodies that are not JSON objects with an `events` array pass through
    /// untouched. An `events` array left empty after filtering, including one
    /// that arrived empty, is dropped.
    pub fn apply(&self, body: &[u8]) -> FilterOutcome {
        let Ok(mut payload) = serde_json::from_slice::<Value>(body) else {
            debug!("Webhook body is not JSON, forwarding as is");
            return FilterOutcome::Forward(body.to_vec());
        };
        let Some(events) = payload.get_mut("events").and_then(Value::as_array_mut) else {
            return FilterOutcome::Forward(body.to_vec());
        };

        let before = events.len();
        events.retain(|event| !self.blocks_event(event));
        let kept = events.len();

        if kept == 0 {
            debug!(filtered = before, "All webhook events filtered");
            return FilterOutcome::Drop;
        }
        if kept == before {
            return FilterOutcome::Forward(body.to_vec());
        }

        debug!(filtered = before - kept, kept, "Removed filtered webhook events");
        match serde_json::to_vec(&payload) {
            Ok(rewritten) => FilterOutcome::Forward(rewritten),
            Err(_) => FilterOutcome::Forward(body.to_vec()),
        }
    }
}
