//! Durable retry queue for forwarding webhook events.
//!
//! This crate provides:
//! - OutboxManager: one actor per queue key, serializing writes while deliveries run alongside
//! - OutboxQueue: enqueue, batched drain with partial-failure requeue, status
//! - QueueStore: snapshot storage with version checks (memory and SQLite)
//! - HttpDeliveryClient: one POST per event, failures folded into an outcome
//! - WakeTimer: backoff-scheduled wake-ups plus a periodic sweep

mod delivery;
mod error;
mod event;
mod manager;
mod queue;
mod retry;
mod scheduler;
mod sqlite;
mod store;

#[cfg(test)]
mod tests;

pub use delivery::{
    Deliverer, DeliveryConfig, DeliveryOutcome, HttpDeliveryClient, DEFAULT_DELIVERY_TIMEOUT,
    HEADER_PROXY_FROM, PROXY_FROM_VALUE,
};
pub use error::{OutboxError, OutboxResult};
pub use event::{
    Attributes, Event, EventId, QueueKey, ATTR_SIGNATURE, ATTR_THINKING_METHOD,
    ATTR_THINKING_SENT,
};
pub use manager::{OutboxManager, QueueHandle, MAILBOX_CAPACITY};
pub use queue::{DrainReport, OutboxQueue, QueueSettings, QueueStatus, DEFAULT_BATCH_LIMIT, MAX_CAS_ATTEMPTS};
pub use retry::{RetryPolicy, RETRY_SCHEDULE_SECS};
pub use scheduler::{spawn_sweep, NoopWakeTimer, TokioWakeTimer, WakeTimer};
pub use sqlite::{SqliteStore, CURRENT_SCHEMA_VERSION};
pub use store::{MemoryStore, QueueSnapshot, QueueStore};
