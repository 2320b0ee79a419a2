//! Configuration management for the relay.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8787";

/// Default per-request delivery timeout.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

/// Default number of events attempted per drain pass.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

/// Default backoff schedule in seconds, indexed by attempt count.
pub const DEFAULT_RETRY_SCHEDULE_SECS: [u64; 7] = [5, 10, 20, 40, 60, 120, 300];

/// Queue used by the un-keyed routes and the webhook front.
pub const DEFAULT_QUEUE: &str = "default";

/// Default interval of the periodic drain sweep.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default LINE Messaging API base URL.
pub const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";

/// Main relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Address the HTTP gateway binds to.
    pub listen_addr: String,
    /// SQLite queue database. Defaults to `Paths::database_file()`.
    pub database_path: Option<PathBuf>,
    /// Downstream URL events are forwarded to. Drains are no-ops while unset.
    pub destination_url: Option<String>,
    /// Per-request timeout for downstream delivery.
    pub delivery_timeout_secs: u64,
    /// Maximum events attempted per drain pass.
    pub batch_limit: usize,
    /// Backoff schedule in seconds.
    pub retry_schedule_secs: Vec<u64>,
    /// Queue key used by the un-keyed routes and the webhook front.
    pub default_queue: String,
    /// Interval of the periodic drain sweep; 0 disables it.
    pub sweep_interval_secs: u64,
    /// Channel secret for inbound webhook signature verification.
    pub channel_secret: Option<String>,
    /// Channel access token for interim "thinking" messages.
    pub channel_access_token: Option<String>,
    /// LINE Messaging API base URL.
    pub line_api_base: String,
    /// Text messages equal to one of these (after trimming) are dropped.
    pub filter_keywords: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            database_path: None,
            destination_url: None,
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            retry_schedule_secs: DEFAULT_RETRY_SCHEDULE_SECS.to_vec(),
            default_queue: DEFAULT_QUEUE.to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            channel_secret: None,
            channel_access_token: None,
            line_api_base: DEFAULT_LINE_API_BASE.to_string(),
            filter_keywords: vec!["名單".to_string()],
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file (defaults when absent),
    /// apply environment overrides, and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override configuration from `RELAY_*` environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup. Unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("RELAY_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("RELAY_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = get("RELAY_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("RELAY_DESTINATION_URL") {
            self.destination_url = Some(v);
        }
        if let Some(v) = get("RELAY_DELIVERY_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.delivery_timeout_secs = v;
        }
        if let Some(v) = get("RELAY_BATCH_LIMIT").and_then(|v| v.parse().ok()) {
            self.batch_limit = v;
        }
        if let Some(v) = get("RELAY_DEFAULT_QUEUE") {
            self.default_queue = v;
        }
        if let Some(v) = get("RELAY_SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.sweep_interval_secs = v;
        }
        if let Some(v) = get("RELAY_CHANNEL_SECRET") {
            self.channel_secret = Some(v);
        }
        if let Some(v) = get("RELAY_CHANNEL_ACCESS_TOKEN") {
            self.channel_access_token = Some(v);
        }
        if let Some(v) = get("RELAY_LINE_API_BASE") {
            self.line_api_base = v;
        }
    }

    /// Check the values that would otherwise fail at first use.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(url) = &self.destination_url {
            Url::parse(url)?;
        }
        Url::parse(&self.line_api_base)?;
        if self.batch_limit == 0 {
            return Err(CoreError::Config("batch_limit must be at least 1".to_string()));
        }
        if self.delivery_timeout_secs == 0 {
            return Err(CoreError::Config(
                "delivery_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.default_queue.trim().is_empty() {
            return Err(CoreError::Config("default_queue must not be empty".to_string()));
        }
        Ok(())
    }

    /// The database path, falling back to the default location.
    pub fn database_path(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// Get the delivery timeout as a Duration.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// Get the sweep interval, or None when the sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Get the retry schedule as Durations.
    pub fn retry_schedule(&self) -> Vec<Duration> {
        self.retry_schedule_secs
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }
}
