//! When an open should produce a notification.
//!
//! Every variant looks only at history recorded *before* the current hit, so
//! the lookup has to run before that hit is inserted.

use crate::services::OpenStore;
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;

pub const DEFAULT_GRACE_SECONDS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// Every hit notifies.
    Always,
    /// The first hit of an id is silent, every later one notifies.
    SecondAndLater,
    /// Silent until strictly more than `grace` has passed since the first hit.
    GracePeriod { grace: Duration },
}

/// What the store knew about an id before the current hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorOpens {
    /// Not looked up; only valid for [`NotifyPolicy::Always`].
    Unknown,
    /// Whether any earlier hit exists.
    Seen(bool),
    /// Timestamp of the earliest hit, if any.
    FirstAt(Option<DateTime<Utc>>),
}

impl NotifyPolicy {
    pub fn grace_period(seconds: u64) -> Self {
        NotifyPolicy::GracePeriod {
            grace: Duration::seconds(seconds.min(u64::from(u32::MAX)) as i64),
        }
    }

    /// Parses `always`, `second` or `grace`.
    pub fn from_config(kind: &str, grace_seconds: u64) -> Result<Self, AppError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(NotifyPolicy::Always),
            "second" | "second-and-later" => Ok(NotifyPolicy::SecondAndLater),
            "grace" | "grace-period" => Ok(NotifyPolicy::grace_period(grace_seconds)),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown NOTIFY_POLICY '{}', expected always, second or grace",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NotifyPolicy::Always => "always",
            NotifyPolicy::SecondAndLater => "second",
            NotifyPolicy::GracePeriod { .. } => "grace",
        }
    }

    /// Pure decision given prior history. A lookup that does not match the
    /// variant is treated as "no history".
    pub fn decide(&self, prior: PriorOpens, now: DateTime<Utc>) -> bool {
        match (self, prior) {
            (NotifyPolicy::Always, _) => true,
            (NotifyPolicy::SecondAndLater, PriorOpens::Seen(seen)) => seen,
            (NotifyPolicy::SecondAndLater, PriorOpens::FirstAt(first)) => first.is_some(),
            (NotifyPolicy::GracePeriod { grace }, PriorOpens::FirstAt(Some(first))) => {
                now - first > *grace
            }
            _ => false,
        }
    }

    /// Runs the lookup this variant needs, then [`NotifyPolicy::decide`].
    pub async fn should_notify(
        &self,
        store: &dyn OpenStore,
        open_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let prior = match self {
            NotifyPolicy::Always => PriorOpens::Unknown,
            NotifyPolicy::SecondAndLater => PriorOpens::Seen(store.exists(open_id).await?),
            NotifyPolicy::GracePeriod { .. } => {
                PriorOpens::FirstAt(store.earliest_timestamp(open_id).await?)
            }
        };

        Ok(self.decide(prior, now))
    }
}
