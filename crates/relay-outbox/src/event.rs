//! Queue identities and the events they hold.

use crate::{OutboxError, OutboxResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute carrying the upstream signature, forwarded verbatim.
pub const ATTR_SIGNATURE: &str = "x-line-signature";

/// Attribute telling the destination whether an interim reply was already sent.
pub const ATTR_THINKING_SENT: &str = "x-thinking-sent";

/// Attribute telling the destination how the interim reply was sent.
pub const ATTR_THINKING_METHOD: &str = "x-thinking-method";

/// Forwarding attributes: opaque name/value pairs sent as request headers.
pub type Attributes = BTreeMap<String, String>;

/// Identity of one independent queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueKey(String);

impl QueueKey {
    /// Create a queue key. Keys must be non-empty.
    pub fn new(key: impl Into<String>) -> OutboxResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(OutboxError::Configuration(
                "queue key must not be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work waiting for delivery.
///
/// Everything except `attempt_count` is fixed at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub enqueued_at: DateTime<Utc>,
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub attempt_count: u32,
}

impl Event {
    /// Create a fresh event with no attempts.
    pub fn new(payload: impl Into<Vec<u8>>, attributes: Attributes) -> Self {
        Self {
            id: EventId::generate(),
            enqueued_at: Utc::now(),
            payload: payload.into(),
            attributes,
            attempt_count: 0,
        }
    }

    /// Look up a forwarding attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Payload bytes are stored as standard base64 so snapshots stay valid JSON
/// text regardless of the payload encoding.
mod payload_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
