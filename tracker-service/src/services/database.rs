//! Open event storage.

use crate::models::{NewOpenEvent, OpenEvent};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, instrument};

/// Append-only store of open events keyed by `open_id`.
#[async_trait]
pub trait OpenStore: Send + Sync {
    /// Appends one event. Never merges with earlier events for the same id.
    async fn insert(&self, event: &NewOpenEvent) -> Result<OpenEvent, AppError>;

    /// True if at least one event with this `open_id` has been stored.
    async fn exists(&self, open_id: &str) -> Result<bool, AppError>;

    /// Timestamp of the first stored event for `open_id`.
    async fn earliest_timestamp(&self, open_id: &str) -> Result<Option<DateTime<Utc>>, AppError>;

    async fn count(&self, open_id: &str) -> Result<i64, AppError>;

    /// Deletes events older than `cutoff`, returning how many were removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Timestamps are stored as fixed-width RFC 3339 text at full nanosecond
/// precision, so string ordering in SQL matches chronological ordering and a
/// value reads back exactly as it was written.
fn to_column(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn db_error(op: &str, e: sqlx::Error) -> AppError {
    tracing::error!(op = op, error = %e, "Open store query failed");
    AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", op, e))
}

/// SQLite-backed store. The schema is created by the embedded migrations.
#[derive(Clone)]
pub struct SqliteOpenStore {
    pool: SqlitePool,
}

impl SqliteOpenStore {
    /// Open (creating if missing) the database file and run migrations.
    #[instrument(fields(service = "tracker-service"))]
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        info!(path = %path.display(), "Opening SQLite open store");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory database, mainly for tests.
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Bad options: {}", e)))?;

        // Every connection to `:memory:` is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl OpenStore for SqliteOpenStore {
    #[instrument(skip(self, event), fields(open_id = %event.open_id))]
    async fn insert(&self, event: &NewOpenEvent) -> Result<OpenEvent, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO opens (open_id, email, user_agent, opened_utc)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&event.open_id)
        .bind(&event.email)
        .bind(&event.user_agent)
        .bind(to_column(event.opened_utc))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert open", e))?;

        Ok(event.clone().into_event(result.last_insert_rowid()))
    }

    #[instrument(skip(self))]
    async fn exists(&self, open_id: &str) -> Result<bool, AppError> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM opens WHERE open_id = ?1)")
                .bind(open_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("check open existence", e))?;

        Ok(found != 0)
    }

    #[instrument(skip(self))]
    async fn earliest_timestamp(&self, open_id: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        sqlx::query_scalar(
            r#"
            SELECT opened_utc FROM opens
            WHERE open_id = ?1
            ORDER BY opened_utc ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(open_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find earliest open", e))
    }

    #[instrument(skip(self))]
    async fn count(&self, open_id: &str) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM opens WHERE open_id = ?1")
            .bind(open_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count opens", e))
    }

    #[instrument(skip(self))]
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM opens WHERE opened_utc < ?1")
            .bind(to_column(cutoff))
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("prune opens", e))?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

/// Vec-backed store with the same semantics as [`SqliteOpenStore`].
#[derive(Default)]
pub struct InMemoryOpenStore {
    events: Mutex<Vec<OpenEvent>>,
    failing: bool,
}

impl InMemoryOpenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation fails, for exercising degraded paths.
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Snapshot of every stored event in insertion order.
    pub fn recorded(&self) -> Vec<OpenEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn events(&self) -> Result<std::sync::MutexGuard<'_, Vec<OpenEvent>>, AppError> {
        if self.failing {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "in-memory store configured to fail"
            )));
        }
        self.events
            .lock()
            .map_err(|_| AppError::DatabaseError(anyhow::anyhow!("open store lock poisoned")))
    }
}

#[async_trait]
impl OpenStore for InMemoryOpenStore {
    async fn insert(&self, event: &NewOpenEvent) -> Result<OpenEvent, AppError> {
        let mut events = self.events()?;
        let stored = event.clone().into_event(events.len() as i64 + 1);
        events.push(stored.clone());
        Ok(stored)
    }

    async fn exists(&self, open_id: &str) -> Result<bool, AppError> {
        Ok(self.events()?.iter().any(|e| e.open_id == open_id))
    }

    async fn earliest_timestamp(&self, open_id: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .events()?
            .iter()
            .filter(|e| e.open_id == open_id)
            .map(|e| e.opened_utc)
            .min())
    }

    async fn count(&self, open_id: &str) -> Result<i64, AppError> {
        Ok(self
            .events()?
            .iter()
            .filter(|e| e.open_id == open_id)
            .count() as i64)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut events = self.events()?;
        let before = events.len();
        events.retain(|e| e.opened_utc >= cutoff);
        Ok((before - events.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.events().map(|_| ())
    }
}
