//! Queue engine: enqueue, batched drain and status over one queue key.
//!
//! Every mutation is a full read-modify-write of the queue snapshot guarded by
//! the store's version check. Within one process the owning actor serializes
//! the writes (see [`crate::manager`]); the version check covers writers in
//! other processes sharing the same store.
//!
//! A drain pass has three steps: [`OutboxQueue::start_drain`] takes the batch,
//! [`DrainBatch::deliver`] sends it, and [`OutboxQueue::finish_drain`] applies
//! the outcomes onto whatever the snapshot holds by then.

use crate::{
    Attributes, Deliverer, Event, EventId, OutboxError, OutboxResult, QueueKey, QueueStore,
    RetryPolicy, WakeTimer,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Events attempted per drain pass.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

/// How many times a read-modify-write is retried after a version conflict.
pub const MAX_CAS_ATTEMPTS: usize = 8;

/// Tunables for a queue engine.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Maximum events attempted in one drain pass. Zero is treated as one.
    pub batch_limit: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// What a drain pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DrainReport {
    /// No destination configured; nothing was read or written.
    NotConfigured,
    /// The queue was empty; nothing was written.
    Empty,
    Completed {
        attempted: usize,
        delivered: usize,
        failed: usize,
        remaining: usize,
        next_wake_at: Option<DateTime<Utc>>,
    },
}

/// Read-only view of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub head: Option<Event>,
    pub next_wake_at: Option<DateTime<Utc>>,
}

/// Per-event results of one pass, keyed by id so they can be re-applied onto
/// a snapshot that changed while the batch was being delivered.
#[derive(Debug, Default)]
pub(crate) struct PassOutcomes {
    delivered: HashSet<EventId>,
    failed: HashMap<EventId, u32>,
}

impl PassOutcomes {
    fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        events
            .into_iter()
            .filter(|event| !self.delivered.contains(&event.id))
            .map(|mut event| {
                if let Some(&count) = self.failed.get(&event.id) {
                    event.attempt_count = event.attempt_count.max(count);
                }
                event
            })
            .collect()
    }
}

/// Where a drain pass stands after reading the queue.
pub(crate) enum DrainStart {
    /// Nothing to deliver.
    Finished(DrainReport),
    Deliver(DrainBatch),
}

/// The head of the queue taken for one pass.
///
/// Owns everything it needs, so delivery can run away from the queue's owner
/// while enqueues and status reads carry on.
pub(crate) struct DrainBatch {
    key: QueueKey,
    deliverer: Arc<dyn Deliverer>,
    events: Vec<Event>,
}

impl DrainBatch {
    /// Deliver the batch in order, one event at a time.
    pub(crate) async fn deliver(self) -> PassOutcomes {
        let mut outcomes = PassOutcomes::default();
        for event in &self.events {
            let outcome = self.deliverer.deliver(event).await;
            if outcome.success {
                outcomes.delivered.insert(event.id.clone());
            } else {
                let attempt_count = event.attempt_count.saturating_add(1);
                warn!(
                    queue = %self.key,
                    event_id = %event.id,
                    status = ?outcome.status_code,
                    error = outcome.error.as_deref().unwrap_or(""),
                    attempt_count,
                    "Delivery failed, keeping event"
                );
                outcomes.failed.insert(event.id.clone(), attempt_count);
            }
        }
        outcomes
    }
}

/// Durable retry queue for a single key.
pub struct OutboxQueue {
    key: QueueKey,
    store: Arc<dyn QueueStore>,
    deliverer: Option<Arc<dyn Deliverer>>,
    timer: Arc<dyn WakeTimer>,
    settings: QueueSettings,
}

impl OutboxQueue {
    /// Create an engine. A `None` deliverer means no destination is
    /// configured; drains then leave the queue untouched.
    pub fn new(
        key: QueueKey,
        store: Arc<dyn QueueStore>,
        deliverer: Option<Arc<dyn Deliverer>>,
        timer: Arc<dyn WakeTimer>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            key,
            store,
            deliverer,
            timer,
            settings,
        }
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    /// Append a new event to the tail and return its id.
    ///
    /// Returns only after the event is durably persisted.
    pub async fn enqueue(&self, payload: Vec<u8>, attributes: Attributes) -> OutboxResult<EventId> {
        let event = Event::new(payload, attributes);
        let id = event.id.clone();

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut snapshot = self.store.load(&self.key).await?;
            snapshot.events.push(event.clone());

            match self
                .store
                .save(&self.key, snapshot.version, &snapshot.events)
                .await
            {
                Ok(_) => {
                    info!(
                        queue = %self.key,
                        event_id = %id,
                        queue_len = snapshot.events.len(),
                        "Event enqueued"
                    );
                    return Ok(id);
                }
                Err(OutboxError::VersionConflict { .. }) => {
                    debug!(queue = %self.key, attempt, "Enqueue lost a version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(self.conflicts_exhausted("enqueue"))
    }

    /// Run one drain pass.
    pub async fn drain(&self) -> OutboxResult<DrainReport> {
        match self.start_drain().await? {
            DrainStart::Finished(report) => Ok(report),
            DrainStart::Deliver(batch) => {
                let outcomes = batch.deliver().await;
                self.finish_drain(&outcomes).await
            }
        }
    }

    /// Read the queue and take the batch for a pass.
    pub(crate) async fn start_drain(&self) -> OutboxResult<DrainStart> {
        let Some(deliverer) = self.deliverer.as_ref() else {
            warn!(queue = %self.key, "No destination configured, skipping drain");
            return Ok(DrainStart::Finished(DrainReport::NotConfigured));
        };

        let snapshot = self.store.load(&self.key).await?;
        if snapshot.events.is_empty() {
            debug!(queue = %self.key, "Drain found empty queue");
            return Ok(DrainStart::Finished(DrainReport::Empty));
        }

        let batch_limit = self.settings.batch_limit.max(1);
        Ok(DrainStart::Deliver(DrainBatch {
            key: self.key.clone(),
            deliverer: deliverer.clone(),
            events: snapshot.events.into_iter().take(batch_limit).collect(),
        }))
    }

    /// Persist a delivered batch's outcomes and schedule the next wake.
    pub(crate) async fn finish_drain(&self, outcomes: &PassOutcomes) -> OutboxResult<DrainReport> {
        let remaining = self.persist_remainder(outcomes).await?;
        let next_wake_at = self.reschedule(&remaining).await?;

        let report = DrainReport::Completed {
            attempted: outcomes.delivered.len() + outcomes.failed.len(),
            delivered: outcomes.delivered.len(),
            failed: outcomes.failed.len(),
            remaining: remaining.len(),
            next_wake_at,
        };
        info!(
            queue = %self.key,
            delivered = outcomes.delivered.len(),
            failed = outcomes.failed.len(),
            remaining = remaining.len(),
            "Drain pass complete"
        );
        Ok(report)
    }

    /// Current length, head and scheduled wake.
    pub async fn status(&self) -> OutboxResult<QueueStatus> {
        let snapshot = self.store.load(&self.key).await?;
        let next_wake_at = self.store.load_wake(&self.key).await?;
        Ok(QueueStatus {
            queue_length: snapshot.events.len(),
            head: snapshot.events.into_iter().next(),
            next_wake_at,
        })
    }

    /// Write the post-pass queue: the current snapshot minus delivered
    /// events, with failed events' counts bumped. Events written while the
    /// batch was out are kept.
    async fn persist_remainder(&self, outcomes: &PassOutcomes) -> OutboxResult<Vec<Event>> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let snapshot = self.store.load(&self.key).await?;
            let remaining = outcomes.apply(snapshot.events);
            match self.store.save(&self.key, snapshot.version, &remaining).await {
                Ok(_) => return Ok(remaining),
                Err(OutboxError::VersionConflict { .. }) => {
                    debug!(queue = %self.key, attempt, "Drain lost a version race, re-applying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(self.conflicts_exhausted("drain"))
    }

    /// Persist and arm the next wake from the head event, or clear it when
    /// the queue is empty.
    async fn reschedule(&self, remaining: &[Event]) -> OutboxResult<Option<DateTime<Utc>>> {
        let Some(head) = remaining.first() else {
            self.store.save_wake(&self.key, None).await?;
            self.timer.cancel(&self.key);
            return Ok(None);
        };

        let delay = self.settings.retry_policy.delay_for(head.attempt_count);
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| OutboxError::Configuration(format!("retry delay out of range: {e}")))?;
        let wake_at = Utc::now() + delay;

        self.store.save_wake(&self.key, Some(wake_at)).await?;
        self.timer.schedule_at(&self.key, wake_at);
        info!(
            queue = %self.key,
            remaining = remaining.len(),
            delay_secs = delay.num_seconds(),
            wake_at = %wake_at,
            "Scheduled next drain"
        );
        Ok(Some(wake_at))
    }

    fn conflicts_exhausted(&self, operation: &str) -> OutboxError {
        OutboxError::Storage(format!(
            "{operation} on queue {} gave up after {MAX_CAS_ATTEMPTS} version conflicts",
            self.key
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeliveryOutcome, MemoryStore, NoopWakeTimer};
    use async_trait::async_trait;

    struct AlwaysOk;

    #[async_trait]
    impl Deliverer for AlwaysOk {
        async fn deliver(&self, _event: &Event) -> DeliveryOutcome {
            DeliveryOutcome::delivered(200)
        }
    }

    fn queue(deliverer: Option<Arc<dyn Deliverer>>) -> (OutboxQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let queue = OutboxQueue::new(
            QueueKey::new("default").unwrap(),
            store.clone(),
            deliverer,
            Arc::new(NoopWakeTimer),
            QueueSettings::default(),
        );
        (queue, store)
    }

    #[test]
    fn test_outcomes_never_lower_attempt_count() {
        let mut event = Event::new(Vec::new(), Attributes::new());
        event.attempt_count = 4;
        let mut outcomes = PassOutcomes::default();
        outcomes.failed.insert(event.id.clone(), 2);

        let applied = outcomes.apply(vec![event]);
        assert_eq!(applied[0].attempt_count, 4);
    }

    #[test]
    fn test_outcomes_keep_events_added_concurrently() {
        let delivered = Event::new(b"a".to_vec(), Attributes::new());
        let newcomer = Event::new(b"b".to_vec(), Attributes::new());
        let mut outcomes = PassOutcomes::default();
        outcomes.delivered.insert(delivered.id.clone());

        let applied = outcomes.apply(vec![delivered, newcomer.clone()]);
        assert_eq!(applied, vec![newcomer]);
    }

    #[tokio::test]
    async fn test_status_of_new_queue() {
        let (queue, _) = queue(None);
        let status = queue.status().await.unwrap();
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.head, None);
        assert_eq!(status.next_wake_at, None);
    }

    #[tokio::test]
    async fn test_not_configured_leaves_queue_alone() {
        let (queue, store) = queue(None);
        queue.enqueue(b"x".to_vec(), Attributes::new()).await.unwrap();

        assert_eq!(queue.drain().await.unwrap(), DrainReport::NotConfigured);
        let snapshot = store.load(queue.key()).await.unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].attempt_count, 0);
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn test_successful_drain_clears_queue_and_wake() {
        let (queue, store) = queue(Some(Arc::new(AlwaysOk)));
        queue.enqueue(b"x".to_vec(), Attributes::new()).await.unwrap();
        store
            .save_wake(queue.key(), Some(Utc::now()))
            .await
            .unwrap();

        let report = queue.drain().await.unwrap();
        assert_eq!(
            report,
            DrainReport::Completed {
                attempted: 1,
                delivered: 1,
                failed: 0,
                remaining: 0,
                next_wake_at: None,
            }
        );
        assert_eq!(store.load_wake(queue.key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_events_enqueued_during_delivery_are_kept() {
        let (queue, store) = queue(Some(Arc::new(AlwaysOk)));
        queue.enqueue(b"early".to_vec(), Attributes::new()).await.unwrap();

        let DrainStart::Deliver(batch) = queue.start_drain().await.unwrap() else {
            panic!("expected a batch to deliver");
        };
        queue.enqueue(b"late".to_vec(), Attributes::new()).await.unwrap();
        let outcomes = batch.deliver().await;

        let report = queue.finish_drain(&outcomes).await.unwrap();
        assert!(matches!(
            report,
            DrainReport::Completed {
                delivered: 1,
                remaining: 1,
                ..
            }
        ));
        let snapshot = store.load(queue.key()).await.unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].payload, b"late");
    }

    #[tokio::test]
    async fn test_drain_report_json_shape() {
        let json = serde_json::to_value(DrainReport::Empty).unwrap();
        assert_eq!(json, serde_json::json!({"result": "empty"}));
    }
}
