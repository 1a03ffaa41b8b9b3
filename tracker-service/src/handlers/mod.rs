//! HTTP handlers for tracker-service.

pub mod health;
pub mod metrics;
pub mod pixel;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_endpoint;
pub use pixel::track_open;
