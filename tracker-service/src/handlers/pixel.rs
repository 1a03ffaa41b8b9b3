use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use isbot::Bots;
use service_core::error::AppError;
use std::sync::OnceLock;

use crate::models::NewOpenEvent;
use crate::services::{metrics, open_message};
use crate::startup::AppState;

static BOTS: OnceLock<Bots> = OnceLock::new();

/// Query key carrying the recipient address.
const EMAIL_PARAM: &str = "e";

/// First `e` value in the query string. Repeated keys are tolerated, the way
/// a mail client that rewrites URLs might produce them.
pub fn email_param(pairs: &[(String, String)]) -> Option<String> {
    pairs
        .iter()
        .find(|(key, _)| key == EMAIL_PARAM)
        .map(|(_, value)| value.clone())
}

/// Strips the trailing `.<ext>` from the path segment.
pub fn open_id_from_file(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file,
    }
}

/// Crawlers, link scanners and clients that send no user agent at all.
pub fn is_bot(user_agent: &str) -> bool {
    user_agent.is_empty() || BOTS.get_or_init(Bots::default).is_bot(user_agent)
}

/// Records an open and returns the pixel.
///
/// Storage and notification failures are logged and otherwise ignored: the
/// viewer always receives the same image.
#[tracing::instrument(skip(state, params, headers), fields(open_id = tracing::field::Empty))]
pub async fn track_open(
    State(state): State<AppState>,
    Path(file): Path<String>,
    params: Option<Query<Vec<(String, String)>>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let open_id = open_id_from_file(&file);
    if open_id.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!("Unknown tracking id")));
    }
    tracing::Span::current().record("open_id", open_id);

    let email = params.and_then(|Query(pairs)| email_param(&pairs));
    let user_agent = headers
        .get(header::USER_AGENT)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    let bot = is_bot(user_agent.as_deref().unwrap_or_default());
    metrics::record_open(bot);

    let (event, should_notify) = {
        let _guard = state.locks.lock(open_id).await;
        let now = state.clock.now();

        let should_notify = match state
            .policy
            .should_notify(state.store.as_ref(), open_id, now)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(error = %e, "Open history lookup failed, not notifying");
                metrics::record_store_error("lookup");
                false
            }
        };

        let event = NewOpenEvent::new(open_id, email, user_agent, now);
        if let Err(e) = state.store.insert(&event).await {
            tracing::error!(error = %e, "Failed to record open");
            metrics::record_store_error("insert");
        }

        tracing::info!(
            policy = state.policy.name(),
            should_notify = should_notify,
            bot = bot,
            "Open recorded"
        );

        (event, should_notify)
    };

    if should_notify {
        match state
            .notifier
            .notify(&open_message(&event.email, &event.open_id))
            .await
        {
            Ok(()) => metrics::record_notification("sent"),
            Err(e) => {
                tracing::warn!(error = %e, "Open notification failed");
                metrics::record_notification("failed");
            }
        }
    } else {
        metrics::record_notification("suppressed");
    }

    Ok((
        [
            (header::CONTENT_TYPE, state.asset.content_type().to_string()),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, max-age=0".to_string(),
            ),
        ],
        state.asset.bytes(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_id_drops_only_the_last_extension() {
        assert_eq!(open_id_from_file("abc123.png"), "abc123");
        assert_eq!(open_id_from_file("abc.123.jpeg"), "abc.123");
        assert_eq!(open_id_from_file("abc123"), "abc123");
        assert_eq!(open_id_from_file(".png"), "");
    }

    #[test]
    fn email_param_takes_the_first_value() {
        let pairs = vec![
            ("e".to_string(), "a@b.com".to_string()),
            ("utm".to_string(), "x".to_string()),
            ("e".to_string(), "c@d.com".to_string()),
        ];
        assert_eq!(email_param(&pairs).as_deref(), Some("a@b.com"));
        assert_eq!(email_param(&[]), None);
    }

    #[test]
    fn classifies_crawlers_and_blank_agents_as_bots() {
        assert!(is_bot(""));
        assert!(is_bot("Googlebot/2.1 (+http://www.google.com/bot.html)"));
        assert!(!is_bot(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko)"
        ));
    }
}
