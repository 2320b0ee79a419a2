//! Gateway tests over a real listener.
//!
//! - `harness.rs`      - spawns the gateway over an in-memory store
//! - `queue_routes.rs` - enqueue, drain, status, drain-all and fallback routes
//! - `webhook.rs`      - LINE webhook: signature, filtering, thinking, queueing

mod queue_routes;
