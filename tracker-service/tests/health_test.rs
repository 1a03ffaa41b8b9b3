mod common;

use common::{TestApp, TestRouter, CHROME_UA};
use reqwest::Client;
use tracker_service::policy::NotifyPolicy;
use tracker_service::services::{InMemoryOpenStore, MockNotifier, OpenStore};

// =============================================================================
// Health Check
// =============================================================================

#[tokio::test]
async fn health_check_works_without_a_datastore() {
    // A failing store proves /health never touches it.
    let app = TestRouter::with_parts(
        NotifyPolicy::Always,
        InMemoryOpenStore::failing(),
        MockNotifier::new(),
    );

    let (status, _, body) = app.get("/health").await;

    assert!(status.is_success());
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn readiness_reports_store_failures() {
    let app = TestRouter::with_parts(
        NotifyPolicy::Always,
        InMemoryOpenStore::failing(),
        MockNotifier::new(),
    );

    let (status, _, _) = app.get("/ready").await;

    assert_eq!(status, axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Spawned server
// =============================================================================

#[tokio::test]
async fn spawned_server_serves_pixel_and_records_opens() {
    let app = TestApp::spawn("second", None).await;
    let client = Client::new();

    let response = client
        .get(format!("{}/t/abc123.png?e=user@example.com", app.address))
        .header("user-agent", CHROME_UA)
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.headers()["content-type"], "image/gif");
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers()["cache-control"]
        .to_str()
        .unwrap()
        .contains("no-store"));
    let body = response.bytes().await.unwrap();
    assert!(body.starts_with(b"GIF89a"));

    assert_eq!(app.store.count("abc123").await.unwrap(), 1);

    let ready = client
        .get(format!("{}/ready", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(ready.status().is_success());
}

#[tokio::test]
async fn spawned_server_serves_configured_image() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("signature.png");
    let png = b"\x89PNG\r\n\x1a\nfake-signature";
    std::fs::write(&image, png).unwrap();

    let app = TestApp::spawn("always", Some(image)).await;

    let response = Client::new()
        .get(format!("{}/t/sig-42.png", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(&response.bytes().await.unwrap()[..], &png[..]);
}

#[tokio::test]
async fn unknown_policy_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = tracker_service::config::TrackerConfig {
        common: service_core::config::Config {
            port: 0,
            ..Default::default()
        },
        database: tracker_service::config::DatabaseConfig {
            path: dir.path().join("opens.db"),
        },
        image: tracker_service::config::ImageConfig { path: None },
        slack: tracker_service::config::SlackConfig {
            webhook_url: None,
            timeout_secs: 1,
        },
        policy: tracker_service::config::PolicyConfig {
            kind: "sometimes".to_string(),
            grace_seconds: 5,
        },
        retention: tracker_service::config::RetentionConfig { days: None },
    };

    assert!(tracker_service::startup::Application::build(config)
        .await
        .is_err());
}
