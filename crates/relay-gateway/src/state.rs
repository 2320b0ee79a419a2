use crate::{GatewayError, KeywordFilter, ThinkingNotifier};
use relay_config::Config;
use relay_outbox::{OutboxManager, QueueKey};
use std::sync::Arc;
use tracing::warn;

/// Settings for the inbound LINE webhook route.
pub struct WebhookSettings {
    pub channel_secret: Option<String>,
    pub filter: KeywordFilter,
    pub notifier: Option<ThinkingNotifier>,
}

impl WebhookSettings {
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let filter = KeywordFilter::new(config.filter_keywords.iter().cloned());

        let notifier = match non_empty(&config.channel_access_token) {
            Some(token) => Some(ThinkingNotifier::new(
                config.line_api_base.clone(),
                token,
                filter.clone(),
            )?),
            None => {
                warn!("No channel access token configured; thinking messages disabled");
                None
            }
        };

        Ok(Self {
            channel_secret: non_empty(&config.channel_secret),
            filter,
            notifier,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct GatewayState {
    pub manager: Arc<OutboxManager>,
    pub default_queue: QueueKey,
    pub webhook: Arc<WebhookSettings>,
}

impl GatewayState {
    pub fn new(
        manager: Arc<OutboxManager>,
        default_queue: QueueKey,
        webhook: WebhookSettings,
    ) -> Self {
        Self {
            manager,
            default_queue,
            webhook: Arc::new(webhook),
        }
    }

    pub fn from_config(config: &Config, manager: Arc<OutboxManager>) -> Result<Self, GatewayError> {
        let default_queue = QueueKey::new(config.default_queue.clone())?;
        Ok(Self::new(
            manager,
            default_queue,
            WebhookSettings::from_config(config)?,
        ))
    }
}
