//! Timer-driven wake-ups and the periodic sweep.
//!
//! A queue's persisted wake timestamp only says when the next drain *should*
//! run. Something has to actually fire it: [`TokioWakeTimer`] keeps one
//! sleeping task per queue key and, on expiry, sends the key over a channel
//! that the manager turns into a drain request. The sweep is a coarse
//! fallback that asks every known queue to drain on a fixed period, so a
//! lost timer can only delay delivery, never strand it.

use crate::{OutboxManager, QueueKey};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Arms and disarms per-queue wake-ups.
pub trait WakeTimer: Send + Sync {
    /// Fire a drain for `key` at `at`, replacing any earlier schedule for it.
    fn schedule_at(&self, key: &QueueKey, at: DateTime<Utc>);

    /// Drop any pending wake-up for `key`.
    fn cancel(&self, key: &QueueKey);
}

/// Timer that never fires. Drains then only happen on enqueue, on request
/// or from the sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWakeTimer;

impl WakeTimer for NoopWakeTimer {
    fn schedule_at(&self, _key: &QueueKey, _at: DateTime<Utc>) {}

    fn cancel(&self, _key: &QueueKey) {}
}

/// Wake timer backed by tokio sleeps.
///
/// Must be used from within a tokio runtime.
pub struct TokioWakeTimer {
    fired: mpsc::UnboundedSender<QueueKey>,
    pending: Mutex<HashMap<QueueKey, JoinHandle<()>>>,
}

impl TokioWakeTimer {
    /// Create a timer and the receiver its expirations are delivered on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueKey>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let timer = Self {
            fired,
            pending: Mutex::new(HashMap::new()),
        };
        (timer, rx)
    }

    /// Number of keys with an armed wake-up that has not fired yet.
    pub fn armed_count(&self) -> usize {
        self.pending
            .lock()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl WakeTimer for TokioWakeTimer {
    fn schedule_at(&self, key: &QueueKey, at: DateTime<Utc>) {
        // Past-due timestamps fire on the next poll.
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let fired = self.fired.clone();
        let queue = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(queue = %queue, "Wake timer fired");
            let _ = fired.send(queue);
        });

        if let Some(previous) = self.pending.lock().insert(key.clone(), handle) {
            previous.abort();
        }
        debug!(queue = %key, delay_secs = delay.as_secs(), "Wake timer armed");
    }

    fn cancel(&self, key: &QueueKey) {
        if let Some(handle) = self.pending.lock().remove(key) {
            handle.abort();
            debug!(queue = %key, "Wake timer cancelled");
        }
    }
}

impl Drop for TokioWakeTimer {
    fn drop(&mut self) {
        for (_, handle) in self.pending.lock().drain() {
            handle.abort();
        }
    }
}

/// Spawn the periodic sweep: every `period`, request a drain on every queue
/// the manager knows about.
///
/// The first sweep runs one full period after start; startup recovery covers
/// the time before that.
pub fn spawn_sweep(manager: Arc<OutboxManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(period_secs = period.as_secs(), "Sweep started");
        loop {
            ticker.tick().await;
            match manager.request_drain_all().await {
                Ok(count) => debug!(queues = count, "Sweep requested drains"),
                Err(e) => warn!(error = %e, "Sweep failed to list queues"),
            }
        }
    })
}
