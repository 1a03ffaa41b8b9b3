use axum::{extract::State, http::StatusCode, response::IntoResponse};
use service_core::error::AppError;

use crate::startup::AppState;

/// Liveness check. Touches nothing.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check: the open store must answer.
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::ServiceUnavailable
    })?;
    Ok(StatusCode::OK)
}
