//! Configuration, paths, and logging setup for the webhook relay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_BATCH_LIMIT, DEFAULT_DELIVERY_TIMEOUT_SECS, DEFAULT_LINE_API_BASE,
    DEFAULT_LISTEN_ADDR, DEFAULT_LOG_LEVEL, DEFAULT_QUEUE, DEFAULT_RETRY_SCHEDULE_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging_for_service;
pub use paths::Paths;
