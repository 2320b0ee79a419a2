//! Interim "thinking" acknowledgment sent to the user before the event is
//! queued.
//!
//! A reply (using the event's reply token) is tried first. If no reply went
//! out, a push to the event source is tried instead. The outcome travels with
//! the queued event as the `x-thinking-sent` / `x-thinking-method`
//! attributes, so the destination knows whether the user already heard back.

use crate::KeywordFilter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Text of the interim message.
pub const THINKING_MESSAGE: &str = "📊 思考分析中，請稍候...";

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// How the interim message reached the user, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingMethod {
    Reply,
    Push,
    None,
}

impl ThinkingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingMethod::Reply => "reply",
            ThinkingMethod::Push => "push",
            ThinkingMethod::None => "none",
        }
    }

    pub fn sent(&self) -> bool {
        !matches!(self, ThinkingMethod::None)
    }

    /// Value for the `x-thinking-sent` attribute.
    pub fn sent_flag(&self) -> &'static str {
        if self.sent() {
            "1"
        } else {
            "0"
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(rename = "type", default)]
    kind: String,
    reply_token: Option<String>,
    message: Option<WebhookMessage>,
    source: Option<WebhookSource>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookSource {
    user_id: Option<String>,
    group_id: Option<String>,
    room_id: Option<String>,
}

impl WebhookSource {
    fn target(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.group_id.as_deref())
            .or(self.room_id.as_deref())
    }
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

/// Sends the interim message through the LINE messaging API.
pub struct ThinkingNotifier {
    client: Client,
    api_base: String,
    access_token: String,
    message: String,
    filter: KeywordFilter,
}

impl ThinkingNotifier {
    pub fn new(
        api_base: impl Into<String>,
        access_token: impl Into<String>,
        filter: KeywordFilter,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            message: THINKING_MESSAGE.to_string(),
            filter,
        })
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Acknowledge every eligible text message in `body`: reply first, push
    /// when no reply succeeded. Never fails; problems are logged.
    pub async fn notify(&self, body: &[u8]) -> ThinkingMethod {
        let payload: WebhookBody = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Webhook body has no LINE events, skipping thinking message");
                return ThinkingMethod::None;
            }
        };

        let eligible: Vec<&WebhookEvent> = payload
            .events
            .iter()
            .filter(|event| self.is_eligible(event))
            .collect();
        if eligible.is_empty() {
            return ThinkingMethod::None;
        }

        if self.reply_all(&eligible).await {
            return ThinkingMethod::Reply;
        }
        if self.push_all(&eligible).await {
            return ThinkingMethod::Push;
        }
        ThinkingMethod::None
    }

    fn is_eligible(&self, event: &WebhookEvent) -> bool {
        match &event.message {
            Some(message) => {
                event.kind == "message"
                    && message.kind == "text"
                    && !self.filter.is_blocked(&message.text)
            }
            None => false,
        }
    }

    async fn reply_all(&self, events: &[&WebhookEvent]) -> bool {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let mut sent = false;

        for event in events {
            let Some(reply_token) = event.reply_token.as_deref() else {
                continue;
            };
            let request = ReplyRequest {
                reply_token,
                messages: [self.text_message()],
            };
            if self.post(&url, &request, "reply").await {
                sent = true;
            }
        }
        sent
    }

    async fn push_all(&self, events: &[&WebhookEvent]) -> bool {
        let url = format!("{}/v2/bot/message/push", self.api_base);
        let mut sent = false;

        for event in events {
            let Some(to) = event.source.as_ref().and_then(WebhookSource::target) else {
                continue;
            };
            let request = PushRequest {
                to,
                messages: [self.text_message()],
            };
            if self.post(&url, &request, "push").await {
                sent = true;
            }
        }
        sent
    }

    fn text_message(&self) -> TextMessage<'_> {
        TextMessage {
            kind: "text",
            text: &self.message,
        }
    }

    async fn post<T: Serialize>(&self, url: &str, request: &T, method: &str) -> bool {
        let result = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(method, "Thinking message sent");
                true
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                warn!(method, status, body = %body, "Thinking message rejected");
                false
            }
            Err(e) => {
                warn!(method, error = %e, "Thinking message request failed");
                false
            }
        }
    }
}
