//! HTTP front for the webhook relay.
//!
//! Routes:
//! - `POST /enqueue`, `POST /queues/{queue}/enqueue`: queue the request body
//! - `POST /drain`, `POST /queues/{queue}/drain`: run one drain pass
//! - `GET /status`, `GET /queues/{queue}/status`: length, head and next wake
//! - `POST /drain-all`: ask every queue to drain
//! - `POST /line-webhook`: verify, filter, acknowledge and queue a LINE webhook
//! - `GET /`: liveness

mod app;
mod error;
mod filter;
pub mod handlers;
mod routes;
mod server;
pub mod signature;
mod state;
mod thinking;

#[cfg(test)]
mod tests;

pub use app::get_app;
pub use error::{ApiError, GatewayError};
pub use filter::{FilterOutcome, KeywordFilter};
pub use server::serve;
pub use state::{GatewayState, WebhookSettings};
pub use thinking::{ThinkingMethod, ThinkingNotifier, THINKING_MESSAGE};
