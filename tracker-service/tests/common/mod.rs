#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{HeaderValue, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use tower::util::ServiceExt;
use tracker_service::config::{
    DatabaseConfig, ImageConfig, PolicyConfig, RetentionConfig, SlackConfig, TrackerConfig,
};
use tracker_service::policy::NotifyPolicy;
use tracker_service::services::{
    InMemoryOpenStore, ManualClock, MockNotifier, OpenStore, PixelAsset,
};
use tracker_service::startup::{build_router, AppState, Application};

pub const CHROME_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

pub fn start_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Router wired to in-memory fakes, driven with `oneshot`.
pub struct TestRouter {
    pub router: Router,
    pub store: Arc<InMemoryOpenStore>,
    pub notifier: Arc<MockNotifier>,
    pub clock: Arc<ManualClock>,
}

impl TestRouter {
    pub fn new(policy: NotifyPolicy) -> Self {
        Self::with_parts(policy, InMemoryOpenStore::new(), MockNotifier::new())
    }

    pub fn with_parts(
        policy: NotifyPolicy,
        store: InMemoryOpenStore,
        notifier: MockNotifier,
    ) -> Self {
        let store = Arc::new(store);
        let notifier = Arc::new(notifier);
        let clock = Arc::new(ManualClock::new(start_time()));

        let state = AppState::new(
            store.clone(),
            notifier.clone(),
            policy,
            PixelAsset::transparent_gif(),
        )
        .with_clock(clock.clone());

        Self {
            router: build_router(state),
            store,
            notifier,
            clock,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Option<String>, Bytes) {
        self.get_with_user_agent(uri, HeaderValue::from_static(CHROME_UA))
            .await
    }

    pub async fn get_with_user_agent(
        &self,
        uri: &str,
        user_agent: HeaderValue,
    ) -> (StatusCode, Option<String>, Bytes) {
        let request = Request::builder()
            .uri(uri)
            .header("user-agent", user_agent)
            .body(Body::empty())
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, content_type, body)
    }

    pub async fn count(&self, open_id: &str) -> i64 {
        self.store.count(open_id).await.unwrap()
    }
}

/// Full server on a random port backed by a SQLite file.
pub struct TestApp {
    pub address: String,
    pub store: Arc<dyn OpenStore>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn spawn(policy: &str, image: Option<std::path::PathBuf>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let config = TrackerConfig {
            common: CoreConfig {
                port: 0,
                ..CoreConfig::default()
            },
            database: DatabaseConfig {
                path: dir.path().join("opens.db"),
            },
            image: ImageConfig { path: image },
            slack: SlackConfig {
                webhook_url: None,
                timeout_secs: 1,
            },
            policy: PolicyConfig {
                kind: policy.to_string(),
                grace_seconds: 5,
            },
            retention: RetentionConfig { days: None },
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let address = format!("http://127.0.0.1:{}", app.port());
        let store = app.store();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            store,
            _dir: dir,
        }
    }
}
