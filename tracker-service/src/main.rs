use service_core::config::Config;
use service_core::observability::{init_metrics, init_tracing};
use tracker_service::config::TrackerConfig;
use tracker_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = TrackerConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    let Config {
        log_level,
        otlp_endpoint,
        ..
    } = &config.common;
    init_tracing("tracker-service", log_level, otlp_endpoint.as_deref());

    init_metrics().map_err(|e| {
        tracing::error!("Failed to install metrics recorder: {}", e);
        std::io::Error::other(format!("Metrics error: {}", e))
    })?;

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start tracker service: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}
