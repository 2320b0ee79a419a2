//! HTTP delivery of queued events to the downstream endpoint.

use crate::event::{ATTR_THINKING_METHOD, ATTR_THINKING_SENT};
use crate::{Event, OutboxError, OutboxResult};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, warn};

/// Origin marker header added to every forwarded request.
pub const HEADER_PROXY_FROM: &str = "x-proxy-from";

/// Value of [`HEADER_PROXY_FROM`].
pub const PROXY_FROM_VALUE: &str = "webhook-relay";

/// Default per-request timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one delivery attempt.
///
/// Transport errors and non-2xx responses are both plain failures; the queue
/// does not distinguish between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(status_code: u16) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            error: None,
        }
    }

    pub fn failed(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            error: Some(error.into()),
        }
    }
}

/// Something that can attempt to hand one event to its destination.
///
/// Implementations never return an error: every problem is folded into the
/// outcome.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, event: &Event) -> DeliveryOutcome;
}

/// Delivery client configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Absolute URL every event is POSTed to.
    pub destination_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl DeliveryConfig {
    pub fn new(destination_url: impl Into<String>) -> Self {
        Self {
            destination_url: destination_url.into(),
            timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Forwards events with one HTTP POST each.
pub struct HttpDeliveryClient {
    destination: Url,
    client: Client,
}

impl HttpDeliveryClient {
    /// Create a client for `config.destination_url`.
    pub fn new(config: DeliveryConfig) -> OutboxResult<Self> {
        let destination = Url::parse(&config.destination_url).map_err(|e| {
            OutboxError::Configuration(format!(
                "invalid destination url {:?}: {e}",
                config.destination_url
            ))
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OutboxError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            destination,
            client,
        })
    }

    pub fn destination(&self) -> &Url {
        &self.destination
    }
}

fn is_reserved_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case(HEADER_PROXY_FROM)
}

#[async_trait]
impl Deliverer for HttpDeliveryClient {
    async fn deliver(&self, event: &Event) -> DeliveryOutcome {
        let mut request = self
            .client
            .post(self.destination.clone())
            .header("content-type", "application/json")
            .header(HEADER_PROXY_FROM, PROXY_FROM_VALUE);

        for (name, value) in &event.attributes {
            if is_reserved_header(name) {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }
        if event.attribute(ATTR_THINKING_SENT).is_none() {
            request = request.header(ATTR_THINKING_SENT, "0");
        }
        if event.attribute(ATTR_THINKING_METHOD).is_none() {
            request = request.header(ATTR_THINKING_METHOD, "none");
        }

        match request.body(event.payload.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(event_id = %event.id, status = status.as_u16(), "Event delivered");
                    DeliveryOutcome::delivered(status.as_u16())
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!(
                        event_id = %event.id,
                        status = status.as_u16(),
                        body = %body,
                        "Destination rejected event"
                    );
                    DeliveryOutcome::failed(Some(status.as_u16()), format!("HTTP {status}"))
                }
            }
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Delivery request failed");
                DeliveryOutcome::failed(e.status().map(|s| s.as_u16()), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ATTR_SIGNATURE;
    use crate::Attributes;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpDeliveryClient {
        HttpDeliveryClient::new(
            DeliveryConfig::new(format!("{}/hook", server.uri()))
                .with_timeout(Duration::from_secs(2)),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_destination_is_configuration_error() {
        let err = HttpDeliveryClient::new(DeliveryConfig::new("not a url"))
            .err()
            .unwrap();
        assert!(matches!(err, OutboxError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_forwards_payload_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header("x-proxy-from", "webhook-relay"))
            .and(header("x-line-signature", "abc="))
            .and(header("x-thinking-sent", "1"))
            .and(header("x-thinking-method", "reply"))
            .and(body_bytes(br#"{"events":[]}"#.to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut attributes = Attributes::new();
        attributes.insert(ATTR_SIGNATURE.to_string(), "abc=".to_string());
        attributes.insert(ATTR_THINKING_SENT.to_string(), "1".to_string());
        attributes.insert(ATTR_THINKING_METHOD.to_string(), "reply".to_string());
        let event = Event::new(br#"{"events":[]}"#.to_vec(), attributes);

        let outcome = client_for(&server).deliver(&event).await;
        assert_eq!(outcome, DeliveryOutcome::delivered(200));
    }

    #[tokio::test]
    async fn test_thinking_headers_default_when_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-thinking-sent", "0"))
            .and(header("x-thinking-method", "none"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let event = Event::new(b"{}".to_vec(), Attributes::new());
        assert!(client_for(&server).deliver(&event).await.success);
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let event = Event::new(b"{}".to_vec(), Attributes::new());
        let outcome = client_for(&server).deliver(&event).await;
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, Some(503));
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = HttpDeliveryClient::new(
            DeliveryConfig::new(server.uri()).with_timeout(Duration::from_millis(200)),
        )
        .unwrap();
        let outcome = client
            .deliver(&Event::new(b"{}".to_vec(), Attributes::new()))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_failure() {
        let client = HttpDeliveryClient::new(
            DeliveryConfig::new("http://127.0.0.1:9/hook").with_timeout(Duration::from_secs(1)),
        )
        .unwrap();
        let outcome = client
            .deliver(&Event::new(b"{}".to_vec(), Attributes::new()))
            .await;
        assert!(!outcome.success);
    }
}
