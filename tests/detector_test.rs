//! Detection client wire-protocol tests against a mock backend.

use smilebooth::config::DetectorSettings;
use smilebooth::{cancel_pair, ConnectivityStatus, DetectionClient, SmileDetector, Verdict};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(base_url: String) -> DetectorSettings {
    DetectorSettings {
        base_url,
        predict_timeout_ms: 2000,
        health_interval_secs: 15,
        health_timeout_secs: 1,
    }
}

fn jpeg_stub() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]
}

#[tokio::test]
async fn predict_decodes_smile_decision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_string_contains("data:image/jpeg;base64,"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "smile": true,
                "score": 0.82
            })),
        )
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    let (_handle, token) = cancel_pair();
    assert_eq!(client.predict(jpeg_stub(), token).await, Verdict::Smile);
}

#[tokio::test]
async fn predict_false_is_no_smile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "smile": false, "score": 0.1 })),
        )
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    let (_handle, token) = cancel_pair();
    assert_eq!(client.predict(jpeg_stub(), token).await, Verdict::NoSmile);
}

#[tokio::test]
async fn server_error_degrades_to_no_smile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    let (_handle, token) = cancel_pair();
    assert_eq!(client.predict(jpeg_stub(), token).await, Verdict::NoSmile);
}

#[tokio::test]
async fn unreachable_backend_degrades_to_no_smile() {
    // Nothing listens on port 1.
    let client = DetectionClient::new(settings("http://127.0.0.1:1".to_string())).unwrap();
    let (_handle, token) = cancel_pair();
    assert_eq!(client.predict(jpeg_stub(), token).await, Verdict::NoSmile);
}

#[tokio::test]
async fn cancellation_yields_no_decision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "smile": true, "score": 0.9 }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    let (handle, token) = cancel_pair();

    let request = tokio::spawn(async move { client.predict(jpeg_stub(), token).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let verdict = request.await.unwrap();
    assert_eq!(verdict, Verdict::NoDecision);
}

#[tokio::test]
async fn client_is_stateless_across_parallel_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "smile": true, "score": 0.7 })),
        )
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    let pairs: Vec<_> = (0..3).map(|_| cancel_pair()).collect();
    let verdicts = futures::future::join_all(
        pairs
            .iter()
            .map(|(_handle, token)| client.predict(jpeg_stub(), token.clone())),
    )
    .await;
    assert!(verdicts.iter().all(|v| *v == Verdict::Smile));
}

#[tokio::test]
async fn manual_capture_posts_to_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/manual_capture"))
        .and(body_string_contains("data:image/jpeg;base64,"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    client.notify_manual(jpeg_stub()).await;
    // Expectation checked when the server drops.
}

#[tokio::test]
async fn manual_capture_failure_is_swallowed() {
    // No server at all: must not panic or return an error.
    let client = DetectionClient::new(settings("http://127.0.0.1:1".to_string())).unwrap();
    client.notify_manual(jpeg_stub()).await;
}

#[tokio::test]
async fn health_monitor_reports_connected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "healthy" })),
        )
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    let mut status = client.spawn_health_monitor();

    for _ in 0..50 {
        if status.borrow().is_connected() {
            return;
        }
        let _ = tokio::time::timeout(Duration::from_millis(100), status.changed()).await;
    }
    panic!("health monitor never reported connected, last: {:?}", *status.borrow());
}

#[tokio::test]
async fn health_monitor_distinguishes_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status": "healthy" }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let client = DetectionClient::new(settings(server.uri())).unwrap();
    let mut status = client.spawn_health_monitor();

    for _ in 0..60 {
        if *status.borrow() == ConnectivityStatus::TimedOut {
            return;
        }
        let _ = tokio::time::timeout(Duration::from_millis(100), status.changed()).await;
    }
    panic!("health monitor never reported timeout, last: {:?}", *status.borrow());
}

#[tokio::test]
async fn health_monitor_reports_unreachable() {
    let client = DetectionClient::new(settings("http://127.0.0.1:1".to_string())).unwrap();
    let status = client.spawn_health_monitor();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*status.borrow(), ConnectivityStatus::Unreachable);
}
