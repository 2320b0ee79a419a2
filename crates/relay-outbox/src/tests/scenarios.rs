//! End-to-end scenarios over SQLite and a real HTTP destination.

use super::harness::attrs;
use crate::{
    Deliverer, DeliveryConfig, DrainReport, HttpDeliveryClient, NoopWakeTimer, OutboxManager,
    QueueKey, QueueSettings, QueueStore, SqliteStore, TokioWakeTimer, ATTR_SIGNATURE,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_deliverer(server: &MockServer) -> Arc<dyn Deliverer> {
    Arc::new(
        HttpDeliveryClient::new(
            DeliveryConfig::new(format!("{}/webhook", server.uri()))
                .with_timeout(Duration::from_secs(2)),
        )
        .unwrap(),
    )
}

async fn sqlite_manager(
    db: &Path,
    deliverer: Option<Arc<dyn Deliverer>>,
) -> (Arc<OutboxManager>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open(db).await.unwrap());
    let manager = Arc::new(OutboxManager::new(
        store.clone(),
        deliverer,
        Arc::new(NoopWakeTimer),
        QueueSettings::default(),
    ));
    (manager, store)
}

#[tokio::test]
async fn downstream_outage_then_recovery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .and(header(ATTR_SIGNATURE, "sig"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let (manager, store) =
        sqlite_manager(&dir.path().join("relay.sqlite"), Some(http_deliverer(&server))).await;
    let key = QueueKey::new("default").unwrap();

    // Enqueue through the engine so the test controls when drains run.
    let handle = manager.queue(&key).await;
    let queue_only = crate::OutboxQueue::new(
        key.clone(),
        store.clone(),
        None,
        Arc::new(NoopWakeTimer),
        QueueSettings::default(),
    );
    queue_only
        .enqueue(br#"{"x":1}"#.to_vec(), attrs(&[(ATTR_SIGNATURE, "sig")]))
        .await
        .unwrap();

    let first = handle.drain().await.unwrap();
    assert!(matches!(first, DrainReport::Completed { failed: 1, remaining: 1, .. }));
    let status = handle.status().await.unwrap();
    assert_eq!(status.queue_length, 1);
    assert_eq!(status.head.unwrap().attempt_count, 1);
    assert!(status.next_wake_at.is_some());

    let second = handle.drain().await.unwrap();
    assert!(matches!(second, DrainReport::Completed { delivered: 1, remaining: 0, .. }));
    assert!(store.load_wake(&key).await.unwrap().is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn queued_events_survive_restart() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("relay.sqlite");
    let key = QueueKey::new("default").unwrap();

    {
        let (manager, _) = sqlite_manager(&db, None).await;
        manager
            .enqueue(&key, b"first".to_vec(), attrs(&[]))
            .await
            .unwrap();
        manager
            .enqueue(&key, b"second".to_vec(), attrs(&[]))
            .await
            .unwrap();
        manager.shutdown().await;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(SqliteStore::open(&db).await.unwrap());
    let (timer, fired) = TokioWakeTimer::new();
    let manager = Arc::new(OutboxManager::new(
        store.clone(),
        Some(http_deliverer(&server)),
        Arc::new(timer),
        QueueSettings::default(),
    ));
    tokio::spawn(manager.clone().run_timer_loop(fired));
    assert_eq!(manager.recover().await.unwrap(), 1);

    let mut remaining = usize::MAX;
    for _ in 0..200 {
        remaining = store.load(&key).await.unwrap().events.len();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(remaining, 0);

    let bodies: Vec<Vec<u8>> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(bodies, vec![b"first".to_vec(), b"second".to_vec()]);
}

#[tokio::test]
async fn two_processes_on_one_database_keep_every_event() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("relay.sqlite");
    let key = QueueKey::new("default").unwrap();

    let (first, _) = sqlite_manager(&db, None).await;
    let (second, store) = sqlite_manager(&db, None).await;

    let mut tasks = Vec::new();
    for i in 0..10u8 {
        for manager in [first.clone(), second.clone()] {
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                manager.enqueue(&key, vec![i], attrs(&[])).await
            }));
        }
    }

    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            accepted += 1;
        }
    }

    assert_eq!(store.load(&key).await.unwrap().events.len(), accepted);
    assert!(accepted > 0);
}
