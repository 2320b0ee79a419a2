//! Webhook relay: durable retry queue in front of a downstream HTTP endpoint.
//!
//! The binary wires configuration, logging, the SQLite-backed queue manager,
//! wake timers and the HTTP gateway together. One-shot operator commands
//! (`status`, `drain`) reuse the same wiring against the database.

mod error;
pub mod relay;

pub use error::{RelayError, RelayResult};
