use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::num::NonZeroU32;
use std::path::PathBuf;

/// About a century; longer windows are indistinguishable from "keep forever".
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub database: DatabaseConfig,
    pub image: ImageConfig,
    pub slack: SlackConfig,
    pub policy: PolicyConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Image served on every hit. `None` serves the built-in 1x1 GIF.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Incoming-webhook URL. `None` disables notifications.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// One of `always`, `second`, `grace`.
    pub kind: String,
    pub grace_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub days: Option<NonZeroU32>,
}

impl TrackerConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let default_db = env::temp_dir().join("opens.db");

        Ok(TrackerConfig {
            common: common_config,
            database: DatabaseConfig {
                path: PathBuf::from(get_env(
                    "DATABASE_PATH",
                    Some(&default_db.to_string_lossy()),
                    false,
                )?),
            },
            image: ImageConfig {
                path: get_optional_env("IMAGE_PATH", is_prod)?.map(PathBuf::from),
            },
            slack: SlackConfig {
                webhook_url: get_optional_env("SLACK_URL", is_prod)?,
                timeout_secs: parse_env("SLACK_TIMEOUT_SECS", 10)?,
            },
            policy: PolicyConfig {
                kind: get_env("NOTIFY_POLICY", Some("grace"), false)?,
                grace_seconds: parse_env("GRACE_SECONDS", 5)?,
            },
            retention: RetentionConfig {
                days: get_optional_env("RETENTION_DAYS", false)?
                    .map(|days| parse_retention_days(&days))
                    .transpose()?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

/// Blank values count as unset so `SLACK_URL=` in a `.env` disables the hook.
fn get_optional_env(key: &str, is_prod: bool) -> Result<Option<String>, AppError> {
    match env::var(key) {
        Ok(val) if !val.trim().is_empty() => Ok(Some(val)),
        _ if is_prod => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} is required in production but not set",
            key
        ))),
        _ => Ok(None),
    }
}

/// Accepts `1..=MAX_RETENTION_DAYS`. Zero would prune every event on each
/// sweep, so it is rejected rather than treated as "no retention".
pub fn parse_retention_days(value: &str) -> Result<NonZeroU32, AppError> {
    let days: NonZeroU32 = value.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "RETENTION_DAYS must be a positive integer: {}",
            e
        ))
    })?;

    if days.get() > MAX_RETENTION_DAYS {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "RETENTION_DAYS must be at most {}, got {}",
            MAX_RETENTION_DAYS,
            days
        )));
    }

    Ok(days)
}

fn parse_env(key: &str, default: u64) -> Result<u64, AppError> {
    match env::var(key) {
        Ok(val) => val.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} must be an integer: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}
