//! Best-effort outbound notifications.
//!
//! Callers log the `Err` side of [`Notifier::notify`] and carry on; nothing
//! here retries.

use crate::config::SlackConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifierError>;
    fn is_enabled(&self) -> bool;
}

/// Text posted when a tracked message is opened.
pub fn open_message(email: &str, open_id: &str) -> String {
    format!("📬 {} opened (id={})", email, open_id)
}

/// Builds the notifier for the given config: Slack when a webhook URL is
/// set, otherwise a no-op.
pub fn from_config(config: &SlackConfig) -> Result<Arc<dyn Notifier>, NotifierError> {
    match config.webhook_url.as_deref() {
        Some(url) => {
            tracing::info!("Slack webhook notifier initialized");
            Ok(Arc::new(SlackNotifier::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        None => {
            tracing::info!("SLACK_URL not set, notifications disabled");
            Ok(Arc::new(DisabledNotifier))
        }
    }
}

/// Posts messages to a Slack incoming webhook.
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
}

impl SlackNotifier {
    pub fn new(webhook_url: &str, timeout: Duration) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Configuration(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            webhook_url: webhook_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&SlackPayload { text: message })
            .send()
            .await
            .map_err(|e| NotifierError::Connection(format!("Failed to reach webhook: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::SendFailed(format!(
                "Webhook returned error status {}: {}",
                status, body
            )));
        }

        tracing::debug!("Webhook notification delivered");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Used when no webhook is configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, _message: &str) -> Result<(), NotifierError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Mock notifier for testing
#[derive(Default)]
pub struct MockNotifier {
    fail: AtomicBool,
    send_count: AtomicU64,
    messages: Mutex<Vec<String>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every call errors.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    /// Attempts made, including failed ones.
    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifierError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifierError::SendFailed(
                "Mock notifier configured to fail".to_string(),
            ));
        }

        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }

        tracing::info!(message = %message, "[MOCK] Notification would be sent");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_email_and_id() {
        assert_eq!(
            open_message("user@example.com", "abc123"),
            "📬 user@example.com opened (id=abc123)"
        );
    }

    #[tokio::test]
    async fn missing_webhook_disables_notifications() {
        let notifier = from_config(&SlackConfig {
            webhook_url: None,
            timeout_secs: 10,
        })
        .unwrap();

        assert!(!notifier.is_enabled());
        assert!(notifier.notify("hello").await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_webhook_is_an_error_not_a_panic() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let notifier =
            SlackNotifier::new("http://127.0.0.1:9/hook", Duration::from_secs(2)).unwrap();
        assert!(notifier.notify("hello").await.is_err());
    }

    #[tokio::test]
    async fn mock_records_messages_and_failures() {
        let ok = MockNotifier::new();
        ok.notify("first").await.unwrap();
        assert_eq!(ok.send_count(), 1);
        assert_eq!(ok.messages(), vec!["first".to_string()]);

        let failing = MockNotifier::failing();
        assert!(failing.notify("second").await.is_err());
        assert_eq!(failing.send_count(), 1);
        assert!(failing.messages().is_empty());
    }
}
