//! Durable storage interface for queue snapshots and wake schedules.

use crate::{Event, OutboxError, OutboxResult, QueueKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A complete queue as last written, with its version token.
///
/// A queue that was never written has version 0 and no events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub events: Vec<Event>,
    pub version: u64,
}

/// Durable key-value storage for queues.
///
/// Snapshots are replaced whole, never patched. `save` is a compare-and-swap:
/// it succeeds only when the stored version still equals `expected_version`
/// and fails with [`OutboxError::VersionConflict`] otherwise.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Read the full snapshot for `key`.
    async fn load(&self, key: &QueueKey) -> OutboxResult<QueueSnapshot>;

    /// Replace the snapshot for `key`, returning the new version.
    async fn save(&self, key: &QueueKey, expected_version: u64, events: &[Event])
        -> OutboxResult<u64>;

    /// Read the scheduled wake time for `key`.
    async fn load_wake(&self, key: &QueueKey) -> OutboxResult<Option<DateTime<Utc>>>;

    /// Overwrite (or clear, with `None`) the scheduled wake time for `key`.
    async fn save_wake(&self, key: &QueueKey, wake_at: Option<DateTime<Utc>>) -> OutboxResult<()>;

    /// Every queue key that has a stored snapshot.
    async fn list_queues(&self) -> OutboxResult<Vec<QueueKey>>;
}

/// In-memory storage for tests and single-process deployments that accept
/// losing the queue on restart.
#[derive(Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<QueueKey, QueueSnapshot>>,
    wakes: Mutex<HashMap<QueueKey, DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load(&self, key: &QueueKey) -> OutboxResult<QueueSnapshot> {
        Ok(self
            .queues
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(
        &self,
        key: &QueueKey,
        expected_version: u64,
        events: &[Event],
    ) -> OutboxResult<u64> {
        let mut queues = self.queues.lock().await;
        let current = queues.get(key).map(|s| s.version).unwrap_or(0);
        if current != expected_version {
            return Err(OutboxError::VersionConflict {
                queue: key.to_string(),
                expected: expected_version,
            });
        }

        let version = current + 1;
        queues.insert(
            key.clone(),
            QueueSnapshot {
                events: events.to_vec(),
                version,
            },
        );
        Ok(version)
    }

    async fn load_wake(&self, key: &QueueKey) -> OutboxResult<Option<DateTime<Utc>>> {
        Ok(self.wakes.lock().await.get(key).copied())
    }

    async fn save_wake(&self, key: &QueueKey, wake_at: Option<DateTime<Utc>>) -> OutboxResult<()> {
        let mut wakes = self.wakes.lock().await;
        match wake_at {
            Some(at) => {
                wakes.insert(key.clone(), at);
            }
            None => {
                wakes.remove(key);
            }
        }
        Ok(())
    }

    async fn list_queues(&self) -> OutboxResult<Vec<QueueKey>> {
        let mut keys: Vec<QueueKey> = self.queues.lock().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Attributes;

    fn key(name: &str) -> QueueKey {
        QueueKey::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_queue_is_empty() {
        let store = MemoryStore::new();
        let snapshot = store.load(&key("default")).await.unwrap();
        assert!(snapshot.events.is_empty());
        assert_eq!(snapshot.version, 0);
    }

    #[tokio::test]
    async fn test_save_bumps_version() {
        let store = MemoryStore::new();
        let q = key("default");
        let event = Event::new(b"a".to_vec(), Attributes::new());

        let v1 = store.save(&q, 0, &[event.clone()]).await.unwrap();
        let v2 = store.save(&q, v1, &[]).await.unwrap();
        assert_eq!((v1, v2), (1, 2));
        assert!(store.load(&q).await.unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let store = MemoryStore::new();
        let q = key("default");
        let event = Event::new(b"a".to_vec(), Attributes::new());

        store.save(&q, 0, &[event.clone()]).await.unwrap();
        let err = store.save(&q, 0, &[]).await.unwrap_err();
        assert!(matches!(err, OutboxError::VersionConflict { expected: 0, .. }));

        let snapshot = store.load(&q).await.unwrap();
        assert_eq!(snapshot.events, vec![event]);
    }

    #[tokio::test]
    async fn test_wake_set_and_clear() {
        let store = MemoryStore::new();
        let q = key("default");
        let at = Utc::now();

        store.save_wake(&q, Some(at)).await.unwrap();
        assert_eq!(store.load_wake(&q).await.unwrap(), Some(at));

        store.save_wake(&q, None).await.unwrap();
        assert_eq!(store.load_wake(&q).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let store = MemoryStore::new();
        let a = key("a");
        let b = key("b");

        store
            .save(&a, 0, &[Event::new(b"1".to_vec(), Attributes::new())])
            .await
            .unwrap();
        store.save(&b, 0, &[]).await.unwrap();

        assert_eq!(store.load(&a).await.unwrap().events.len(), 1);
        assert!(store.load(&b).await.unwrap().events.is_empty());
        assert_eq!(store.list_queues().await.unwrap(), vec![a, b]);
    }
}
