use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recorded in place of the recipient when the `e` query parameter is absent.
pub const UNKNOWN_EMAIL: &str = "unknown";

/// One recorded fetch of the tracking pixel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct OpenEvent {
    pub id: i64,
    pub open_id: String,
    pub email: String,
    pub user_agent: String,
    pub opened_utc: DateTime<Utc>,
}

/// Insert payload; the store assigns `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOpenEvent {
    pub open_id: String,
    pub email: String,
    pub user_agent: String,
    pub opened_utc: DateTime<Utc>,
}

impl NewOpenEvent {
    pub fn new(
        open_id: impl Into<String>,
        email: Option<String>,
        user_agent: Option<String>,
        opened_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            open_id: open_id.into(),
            email: email.unwrap_or_else(|| UNKNOWN_EMAIL.to_string()),
            user_agent: user_agent.unwrap_or_default(),
            opened_utc,
        }
    }

    pub fn into_event(self, id: i64) -> OpenEvent {
        OpenEvent {
            id,
            open_id: self.open_id,
            email: self.email,
            user_agent: self.user_agent,
            opened_utc: self.opened_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_email_and_user_agent_get_defaults() {
        let event = NewOpenEvent::new("abc123", None, None, Utc::now());
        assert_eq!(event.email, "unknown");
        assert_eq!(event.user_agent, "");
    }
}
