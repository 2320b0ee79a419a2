//! Queue routes.

use super::harness::GatewayBuilder;
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn root_reports_liveness() {
    let gateway = GatewayBuilder::new().start().await;

    let response = gateway.client.get(gateway.url("/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "relay ok");

    gateway.stop().await;
}

#[tokio::test]
async fn enqueue_then_status() {
    let gateway = GatewayBuilder::new().start().await;

    let response = gateway
        .client
        .post(gateway.url("/enqueue"))
        .header("x-line-signature", "c2lnbmF0dXJl")
        .header("x-thinking-sent", "1")
        .header("x-thinking-method", "reply")
        .body(r#"{"events":[{"type":"message"}]}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "enqueued");
    let id = body["id"].as_str().unwrap().to_string();

    let status: Value = gateway
        .client
        .get(gateway.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["queue_len"], 1);
    assert_eq!(status["head"]["id"], id.as_str());
    assert_eq!(status["head"]["attempt_count"], 0);
    assert_eq!(status["head"]["attributes"]["x-line-signature"], "c2lnbmF0dXJl");
    assert_eq!(status["head"]["attributes"]["x-thinking-method"], "reply");
    assert!(status["next_wake_at"].is_null());

    gateway.stop().await;
}

#[tokio::test]
async fn empty_status() {
    let gateway = GatewayBuilder::new().start().await;

    let status: Value = gateway
        .client
        .get(gateway.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["queue_len"], 0);
    assert!(status["head"].is_null());

    gateway.stop().await;
}

#[tokio::test]
async fn keyed_queues_are_separate() {
    let gateway = GatewayBuilder::new().start().await;

    for queue in ["alpha", "alpha", "beta"] {
        let response = gateway
            .client
            .post(gateway.url(&format!("/queues/{queue}/enqueue")))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let alpha: Value = gateway
        .client
        .get(gateway.url("/queues/alpha/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alpha["queue_len"], 2);
    assert_eq!(gateway.queue_len("beta").await, 1);
    assert_eq!(gateway.queue_len("default").await, 0);

    gateway.stop().await;
}

#[tokio::test]
async fn blank_queue_name_is_rejected() {
    let gateway = GatewayBuilder::new().start().await;

    let response = gateway
        .client
        .post(gateway.url("/queues/%20/enqueue"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    gateway.stop().await;
}

#[tokio::test]
async fn drain_without_destination_keeps_events() {
    let gateway = GatewayBuilder::new().start().await;
    gateway
        .client
        .post(gateway.url("/enqueue"))
        .body("{}")
        .send()
        .await
        .unwrap();

    let response = gateway.client.post(gateway.url("/drain")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "drain_triggered");
    assert_eq!(gateway.queue_len("default").await, 1);

    gateway.stop().await;
}

#[tokio::test]
async fn drain_against_failing_destination_schedules_retry() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&destination)
        .await;
    let gateway = GatewayBuilder::new()
        .destination(destination.uri())
        .start()
        .await;

    gateway
        .client
        .post(gateway.url("/queues/retry/enqueue"))
        .body("{}")
        .send()
        .await
        .unwrap();
    let response = gateway
        .client
        .post(gateway.url("/queues/retry/drain"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let status: Value = gateway
        .client
        .get(gateway.url("/queues/retry/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["queue_len"], 1);
    // One attempt from the background drain after enqueue, one from /drain.
    assert_eq!(status["head"]["attempt_count"], 2);
    assert!(status["next_wake_at"].is_string());

    gateway.stop().await;
}

#[tokio::test]
async fn drain_all_delivers_every_queue() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&destination)
        .await;
    let gateway = GatewayBuilder::new()
        .destination(destination.uri())
        .start()
        .await;

    for queue in ["a", "b"] {
        gateway
            .client
            .post(gateway.url(&format!("/queues/{queue}/enqueue")))
            .body("{}")
            .send()
            .await
            .unwrap();
    }

    let response = gateway
        .client
        .post(gateway.url("/drain-all"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "drain triggered");

    let mut drained = false;
    for _ in 0..100 {
        if gateway.queue_len("a").await == 0 && gateway.queue_len("b").await == 0 {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(drained);

    gateway.stop().await;
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let gateway = GatewayBuilder::new().start().await;

    let response = gateway
        .client
        .get(gateway.url("/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let wrong_method = gateway
        .client
        .get(gateway.url("/enqueue"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_method.status(), 405);

    gateway.stop().await;
}
