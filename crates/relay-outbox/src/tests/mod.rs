//! Integration tests for the queue engine.
//!
//! - `harness.rs`     - scripted deliverer, recording timer, fault-injecting store
//! - `enqueue.rs`     - durability, FIFO order, background drain after enqueue
//! - `drain.rs`       - outcomes, requeue, wake scheduling, storage failures
//! - `batch.rs`       - batch bound and carry-over
//! - `wake.rs`        - timer redelivery, startup recovery, sweep, coalescing
//! - `concurrency.rs` - concurrent writers in and across processes
//! - `scenarios.rs`   - SQLite and HTTP end to end

mod scenarios;
