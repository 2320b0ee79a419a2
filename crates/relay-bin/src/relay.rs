//! Wiring: config to store, deliverer, manager, timers and gateway.

use crate::RelayResult;
use relay_config::{Config, Paths};
use relay_gateway::GatewayState;
use relay_outbox::{
    spawn_sweep, Deliverer, DeliveryConfig, DrainReport, HttpDeliveryClient, NoopWakeTimer,
    OutboxManager, QueueKey, QueueSettings, QueueStatus, RetryPolicy, SqliteStore,
    TokioWakeTimer, WakeTimer,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Queue tunables from configuration.
pub fn queue_settings(config: &Config) -> QueueSettings {
    QueueSettings {
        batch_limit: config.batch_limit,
        retry_policy: RetryPolicy::with_schedule(config.retry_schedule()),
    }
}

/// The HTTP delivery client, or `None` when no destination is configured.
pub fn build_deliverer(config: &Config) -> RelayResult<Option<Arc<dyn Deliverer>>> {
    let Some(url) = config.destination_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        warn!("No destination URL configured");
        return Ok(None);
    };

    let client = HttpDeliveryClient::new(
        DeliveryConfig::new(url).with_timeout(config.delivery_timeout()),
    )?;
    info!(destination = %client.destination(), "Delivery client ready");
    Ok(Some(Arc::new(client)))
}

pub async fn open_store(config: &Config, paths: &Paths) -> RelayResult<Arc<SqliteStore>> {
    let path = config.database_path(paths);
    Ok(Arc::new(SqliteStore::open(&path).await?))
}

pub fn build_manager(
    config: &Config,
    store: Arc<SqliteStore>,
    timer: Arc<dyn WakeTimer>,
) -> RelayResult<Arc<OutboxManager>> {
    Ok(Arc::new(OutboxManager::new(
        store,
        build_deliverer(config)?,
        timer,
        queue_settings(config),
    )))
}

/// Run the relay server until `shutdown` resolves.
///
/// Recovers persisted wakes, then runs the wake timer loop, the periodic
/// sweep and the HTTP gateway.
pub async fn serve<F>(config: Config, paths: Paths, shutdown: F) -> RelayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(&config.listen_addr).await?;
    serve_on(config, paths, listener, shutdown).await
}

/// Like [`serve`], on an already bound listener.
pub async fn serve_on<F>(
    config: Config,
    paths: Paths,
    listener: TcpListener,
    shutdown: F,
) -> RelayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = open_store(&config, &paths).await?;
    let (timer, fired) = TokioWakeTimer::new();
    let manager = build_manager(&config, store, Arc::new(timer))?;

    manager.recover().await?;
    let timer_loop = tokio::spawn(manager.clone().run_timer_loop(fired));
    let sweep = config
        .sweep_interval()
        .map(|period| spawn_sweep(manager.clone(), period));

    let state = GatewayState::from_config(&config, manager.clone())?;
    let served = relay_gateway::serve(listener, state, shutdown).await;

    if let Some(sweep) = sweep {
        sweep.abort();
    }
    timer_loop.abort();
    manager.shutdown().await;

    served?;
    info!("Relay stopped");
    Ok(())
}

async fn one_shot_manager(config: &Config, paths: &Paths) -> RelayResult<Arc<OutboxManager>> {
    let store = open_store(config, paths).await?;
    build_manager(config, store, Arc::new(NoopWakeTimer))
}

fn resolve_queue(config: &Config, queue: Option<String>) -> RelayResult<QueueKey> {
    Ok(QueueKey::new(
        queue.unwrap_or_else(|| config.default_queue.clone()),
    )?)
}

/// Read a queue's status from the database.
pub async fn status_once(
    config: &Config,
    paths: &Paths,
    queue: Option<String>,
) -> RelayResult<QueueStatus> {
    let key = resolve_queue(config, queue)?;
    let manager = one_shot_manager(config, paths).await?;
    let status = manager.status(&key).await?;
    manager.shutdown().await;
    Ok(status)
}

/// Run one drain pass against the database.
///
/// The wake time it persists is picked up by a running server's sweep or by
/// the next server start.
pub async fn drain_once(
    config: &Config,
    paths: &Paths,
    queue: Option<String>,
) -> RelayResult<DrainReport> {
    let key = resolve_queue(config, queue)?;
    let manager = one_shot_manager(config, paths).await?;
    let report = manager.drain(&key).await?;
    manager.shutdown().await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &std::path::Path) -> (Config, Paths) {
        let paths = Paths::with_base_dir(dir.to_path_buf());
        let config = Config {
            sweep_interval_secs: 0,
            ..Config::default()
        };
        (config, paths)
    }

    #[test]
    fn test_queue_settings_from_config() {
        let config = Config {
            batch_limit: 4,
            retry_schedule_secs: vec![1, 2],
            ..Config::default()
        };
        let settings = queue_settings(&config);
        assert_eq!(settings.batch_limit, 4);
        assert_eq!(settings.retry_policy.delay_for(5), Duration::from_secs(2));
    }

    #[test]
    fn test_no_destination_means_no_deliverer() {
        assert!(build_deliverer(&Config::default()).unwrap().is_none());

        let blank = Config {
            destination_url: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(build_deliverer(&blank).unwrap().is_none());
    }

    #[test]
    fn test_bad_destination_is_an_error() {
        let config = Config {
            destination_url: Some("::not a url::".to_string()),
            ..Config::default()
        };
        assert!(build_deliverer(&config).is_err());
    }

    #[tokio::test]
    async fn test_one_shot_status_and_drain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let (mut config, paths) = test_config(dir.path());

        // Queue an event with no destination so nothing is delivered yet.
        let manager = one_shot_manager(&config, &paths).await.unwrap();
        let key = QueueKey::new("default").unwrap();
        manager
            .enqueue(&key, b"{}".to_vec(), Default::default())
            .await
            .unwrap();
        manager.shutdown().await;

        let status = status_once(&config, &paths, None).await.unwrap();
        assert_eq!(status.queue_length, 1);

        config.destination_url = Some(server.uri());
        let report = drain_once(&config, &paths, Some("default".to_string()))
            .await
            .unwrap();
        assert!(matches!(report, DrainReport::Completed { delivered: 1, .. }));

        let status = status_once(&config, &paths, None).await.unwrap();
        assert_eq!(status.queue_length, 0);
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let (mut config, paths) = test_config(dir.path());
        config.destination_url = Some(server.uri());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let relay = tokio::spawn(serve_on(config, paths, listener, async {
            let _ = stop_rx.await;
        }));

        let client = reqwest_client();
        let response = client
            .post(format!("http://{addr}/enqueue"))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let mut delivered = false;
        for _ in 0..100 {
            if server.received_requests().await.unwrap().len() == 1 {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(delivered);

        stop_tx.send(()).unwrap();
        relay.await.unwrap().unwrap();
    }

    fn reqwest_client() -> reqwest::Client {
        reqwest::Client::new()
    }
}
