//! # Observability
//!
//! Centralized logging for the webhook relay.
//!
//! Services call `observability::init_with_config` once at
//! startup and use standard `tracing` macros everywhere else. They never
//! decide where log lines end up.
//!
//! ## Sinks
//!
//! - Compact human-readable output on stderr.
//! - Optional structured JSONL file (one object per line) when a log path is
//!   configured, e.g. `~/.webhook-relay/logs/relay.jsonl`:
//!   - `tail -f ~/.webhook-relay/logs/relay.jsonl | jq`
//!   - `lnav ~/.webhook-relay/logs/relay.jsonl`
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "webhook-relay".into(),
//!         default_level: "debug".into(),
//!         log_path: Some(paths.log_file()),
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("service started");
//! }
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use file::JsonlFileWriter;
pub use json_layer::LogEntry;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "webhook-relay", "webhook-relay-cli").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file. When unset only stderr is used.
    pub log_path: Option<PathBuf>,

    /// Emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// When the log file cannot be opened, logging falls back to stderr and a
/// warning names the file.
///
/// # Panics
///
/// Panics if a global subscriber was already installed.
pub fn init_with_config(config: LogConfig) {
    let Some(path) = &config.log_path else {
        init_stderr(&config.default_level);
        return;
    };

    if let Err(e) = file::init_file_subscriber(&config, path) {
        init_stderr(&config.default_level);
        tracing::warn!(
            log_path = %path.display(),
            error = %e,
            "Could not open log file, logging to stderr only"
        );
    }
}

fn init_stderr(default_level: &str) {
    use tracing_subscriber::util::SubscriberInitExt;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
        .init();
}

/// `RUST_LOG` when set, otherwise `default_level`.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
