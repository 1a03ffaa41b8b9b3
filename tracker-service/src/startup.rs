//! Application startup and lifecycle management.

use crate::config::TrackerConfig;
use crate::handlers;
use crate::policy::NotifyPolicy;
use crate::services::{
    notifier, Clock, KeyedLocks, Notifier, OpenStore, PixelAsset, SqliteOpenStore, SystemClock,
};
use axum::{middleware::from_fn, routing::get, Router};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OpenStore>,
    pub notifier: Arc<dyn Notifier>,
    pub policy: NotifyPolicy,
    pub clock: Arc<dyn Clock>,
    pub asset: PixelAsset,
    pub locks: KeyedLocks,
}

impl AppState {
    pub fn new(
        store: Arc<dyn OpenStore>,
        notifier: Arc<dyn Notifier>,
        policy: NotifyPolicy,
        asset: PixelAsset,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
            clock: Arc::new(SystemClock),
            asset,
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/t/:file", get(handlers::track_open))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Deletes events older than `days`, once now and then hourly.
pub fn spawn_retention_sweep(
    store: Arc<dyn OpenStore>,
    clock: Arc<dyn Clock>,
    days: NonZeroU32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let window = chrono::Duration::days(i64::from(days.get()));
            let Some(cutoff) = clock.now().checked_sub_signed(window) else {
                tracing::error!(
                    days = days.get(),
                    "Retention window out of range, skipping sweep"
                );
                continue;
            };

            match store.prune_older_than(cutoff).await {
                Ok(removed) => {
                    tracing::info!(removed = removed, cutoff = %cutoff, "Retention sweep finished")
                }
                Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
            }
        }
    })
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    retention: Option<JoinHandle<()>>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: TrackerConfig) -> Result<Self, AppError> {
        let store = SqliteOpenStore::connect(&config.database.path)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to open database at {}: {}",
                    config.database.path.display(),
                    e
                );
                e
            })?;

        let asset = match &config.image.path {
            Some(path) => PixelAsset::load(path).await?,
            None => {
                tracing::info!("IMAGE_PATH not set, serving built-in 1x1 GIF");
                PixelAsset::transparent_gif()
            }
        };

        let policy = NotifyPolicy::from_config(&config.policy.kind, config.policy.grace_seconds)?;
        tracing::info!(policy = policy.name(), "Notification policy selected");

        let notifier = notifier::from_config(&config.slack)
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        let state = AppState::new(Arc::new(store), notifier, policy, asset);

        let retention = config.retention.days.map(|days| {
            tracing::info!(days = days.get(), "Retention sweep enabled");
            spawn_retention_sweep(state.store.clone(), state.clock.clone(), days)
        });

        // Port 0 picks a random port, used by tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Tracker service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
            retention,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn store(&self) -> Arc<dyn OpenStore> {
        self.state.store.clone()
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(retention) = self.retention {
            retention.abort();
        }

        result
    }
}
