//! Logging initialization for the relay.
//!
//! Thin wrapper over the observability crate so binaries share one setup:
//! compact stderr output plus a JSONL file when a log path is given.

use std::path::PathBuf;

/// Initialize logging for one relay process.
///
/// `service_name` tells the server and one-shot operator commands apart in
/// the shared log file. `RUST_LOG` takes precedence over `level`.
///
/// ```ignore
/// init_logging_for_service("webhook-relay", "info", Some(paths.log_file()));
/// tracing::info!("relay started");
/// ```
pub fn init_logging_for_service(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}
