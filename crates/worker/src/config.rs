use std::str::FromStr;
use std::time::Duration;

use retouch_vendors::api::DEFAULT_REQUEST_TIMEOUT;

use crate::gate::DEFAULT_MAX_CONCURRENT;
use crate::housekeeping::{
    HousekeepingConfig, DEFAULT_INTERVAL, DEFAULT_RETENTION_DAYS, DEFAULT_STALE_PROCESSING_MINS,
};
use crate::scheduler::{SchedulerConfig, DEFAULT_MAX_AGE_HOURS, DEFAULT_TICK_INTERVAL};

/// A configuration value that is present but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub scheduler: SchedulerConfig,
    pub housekeeping: HousekeepingConfig,
    /// Bind address of the stats server (default: `0.0.0.0`).
    pub stats_host: String,
    /// Bind port of the stats server (default: `3100`).
    pub stats_port: u16,
    /// Base URL all vendor endpoints hang off.
    pub vendor_api_url: String,
    pub vendor_api_key: Option<String>,
    pub vendor_timeout: Duration,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default        |
    /// |-------------------------|----------------|
    /// | `DATABASE_URL`          | (required)     |
    /// | `TICK_INTERVAL_SECS`    | `30`           |
    /// | `MAX_CONCURRENT`        | `3`            |
    /// | `TASK_MAX_AGE_HOURS`    | `24`           |
    /// | `STATS_HOST`            | `0.0.0.0`      |
    /// | `STATS_PORT`            | `3100`         |
    /// | `RETENTION_DAYS`        | `30`           |
    /// | `STALE_PROCESSING_MINS` | `60`           |
    /// | `VENDOR_API_URL`        | (required)     |
    /// | `VENDOR_API_KEY`        | (none)         |
    /// | `VENDOR_TIMEOUT_SECS`   | `180`          |
    /// | `LOG_FORMAT`            | `text`         |
    ///
    /// Chat delivery settings are read separately by
    /// `retouch_events::ChatConfig::from_env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let vendor_api_url =
            get("VENDOR_API_URL").ok_or(ConfigError::Missing("VENDOR_API_URL"))?;

        let tick_interval_secs: u64 = parse_or(
            get("TICK_INTERVAL_SECS"),
            "TICK_INTERVAL_SECS",
            "a positive integer",
            DEFAULT_TICK_INTERVAL.as_secs(),
        )?;
        if tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "TICK_INTERVAL_SECS",
                expected: "a positive integer",
                value: "0".into(),
            });
        }

        let max_concurrent: usize = parse_or(
            get("MAX_CONCURRENT"),
            "MAX_CONCURRENT",
            "a positive integer",
            DEFAULT_MAX_CONCURRENT,
        )?;
        if max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CONCURRENT",
                expected: "a positive integer",
                value: "0".into(),
            });
        }

        let max_age = positive_duration(
            get("TASK_MAX_AGE_HOURS"),
            "TASK_MAX_AGE_HOURS",
            "a positive number of hours",
            DEFAULT_MAX_AGE_HOURS,
            chrono::Duration::try_hours,
        )?;

        let stats_host = get("STATS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let stats_port: u16 = parse_or(get("STATS_PORT"), "STATS_PORT", "a valid u16", 3100)?;

        let retention = positive_duration(
            get("RETENTION_DAYS"),
            "RETENTION_DAYS",
            "a positive number of days",
            DEFAULT_RETENTION_DAYS,
            chrono::Duration::try_days,
        )?;
        let stale_processing = positive_duration(
            get("STALE_PROCESSING_MINS"),
            "STALE_PROCESSING_MINS",
            "a positive number of minutes",
            DEFAULT_STALE_PROCESSING_MINS,
            chrono::Duration::try_minutes,
        )?;

        let vendor_timeout_secs: u64 = parse_or(
            get("VENDOR_TIMEOUT_SECS"),
            "VENDOR_TIMEOUT_SECS",
            "a positive integer",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?;

        let log_json = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    expected: "'text' or 'json'",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url,
            scheduler: SchedulerConfig {
                tick_interval: Duration::from_secs(tick_interval_secs),
                max_concurrent,
                max_age,
            },
            housekeeping: HousekeepingConfig {
                interval: DEFAULT_INTERVAL,
                retention,
                stale_processing,
                max_age,
            },
            stats_host,
            stats_port,
            vendor_api_url,
            vendor_api_key: get("VENDOR_API_KEY"),
            vendor_timeout: Duration::from_secs(vendor_timeout_secs),
            log_json,
        })
    }
}

fn parse_or<T: FromStr>(
    raw: Option<String>,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
    }
}

/// Parse a positive count of `unit`s into a duration short enough to
/// subtract from the current time.
fn positive_duration(
    raw: Option<String>,
    key: &'static str,
    expected: &'static str,
    default: i64,
    unit: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError> {
    let value: i64 = parse_or(raw, key, expected, default)?;
    unit(value)
        .filter(|d| *d > chrono::Duration::zero())
        .filter(|d| chrono::Utc::now().checked_sub_signed(*d).is_some())
        .ok_or_else(|| ConfigError::Invalid {
            key,
            expected,
            value: value.to_string(),
        })
}
