//! Periodic queue housekeeping.
//!
//! Deletes terminal tasks older than the retention period and warns about
//! two kinds of tasks the scheduler will never finish on its own: tasks
//! stuck in `processing`, which only happens when a worker died between
//! starting an attempt and persisting its outcome, and pending or
//! pending-retry tasks that aged past the scheduler's maximum age. Both are
//! reported, not requeued.

use std::time::Duration;

use retouch_core::types::Timestamp;
use retouch_db::repositories::TaskRepo;
use retouch_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::scheduler::DEFAULT_MAX_AGE_HOURS;

/// How often housekeeping runs.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

pub const DEFAULT_STALE_PROCESSING_MINS: i64 = 60;

#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    pub interval: Duration,
    /// Terminal tasks finished longer ago than this are deleted.
    pub retention: chrono::Duration,
    /// Processing tasks untouched for longer than this are reported.
    pub stale_processing: chrono::Duration,
    /// The scheduler's maximum task age; waiting tasks created before it
    /// are reported.
    pub max_age: chrono::Duration,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            retention: chrono::Duration::days(DEFAULT_RETENTION_DAYS),
            stale_processing: chrono::Duration::minutes(DEFAULT_STALE_PROCESSING_MINS),
            max_age: chrono::Duration::hours(DEFAULT_MAX_AGE_HOURS),
        }
    }
}

impl HousekeepingConfig {
    /// Completion time before which terminal tasks are purged.
    pub fn retention_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.retention
    }

    /// Last-update time before which a processing task counts as stuck.
    pub fn stale_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.stale_processing
    }

    /// Creation time before which a waiting task is never selected again.
    pub fn expired_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.max_age
    }
}

/// Run the housekeeping loop until `cancel` is triggered.
pub async fn run(pool: DbPool, config: HousekeepingConfig, cancel: CancellationToken) {
    tracing::info!(
        retention_days = config.retention.num_days(),
        stale_processing_mins = config.stale_processing.num_minutes(),
        max_age_hours = config.max_age.num_hours(),
        interval_secs = config.interval.as_secs(),
        "Housekeeping job started"
    );

    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Housekeeping job stopping");
                break;
            }
            _ = interval.tick() => {
                sweep(&pool, &config, chrono::Utc::now()).await;
            }
        }
    }
}

async fn sweep(pool: &DbPool, config: &HousekeepingConfig, now: Timestamp) {
    match TaskRepo::delete_terminal_older_than(pool, config.retention_cutoff(now)).await {
        Ok(0) => tracing::debug!("Housekeeping: no terminal tasks to purge"),
        Ok(deleted) => tracing::info!(deleted, "Housekeeping: purged old terminal tasks"),
        Err(e) => tracing::error!(error = %e, "Housekeeping: purge failed"),
    }

    match TaskRepo::stale_processing_ids(pool, config.stale_cutoff(now)).await {
        Ok(ids) if ids.is_empty() => {}
        Ok(ids) => tracing::warn!(
            count = ids.len(),
            task_ids = ?ids,
            "Housekeeping: tasks stuck in processing"
        ),
        Err(e) => tracing::error!(error = %e, "Housekeeping: stale scan failed"),
    }

    match TaskRepo::expired_waiting_ids(pool, config.expired_cutoff(now)).await {
        Ok(ids) if ids.is_empty() => {}
        Ok(ids) => tracing::warn!(
            count = ids.len(),
            task_ids = ?ids,
            "Housekeeping: waiting tasks past max age will not be scheduled"
        ),
        Err(e) => tracing::error!(error = %e, "Housekeeping: expiry scan failed"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn cutoffs_follow_config() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap();
        let config = HousekeepingConfig {
            retention: chrono::Duration::days(7),
            stale_processing: chrono::Duration::minutes(90),
            max_age: chrono::Duration::hours(48),
            ..Default::default()
        };
        assert_eq!(
            config.retention_cutoff(now),
            Utc.with_ymd_and_hms(2026, 3, 24, 12, 0, 0).unwrap()
        );
        assert_eq!(
            config.stale_cutoff(now),
            Utc.with_ymd_and_hms(2026, 3, 31, 10, 30, 0).unwrap()
        );
        assert_eq!(
            config.expired_cutoff(now),
            Utc.with_ymd_and_hms(2026, 3, 29, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn defaults() {
        let config = HousekeepingConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.retention, chrono::Duration::days(30));
        assert_eq!(config.stale_processing, chrono::Duration::minutes(60));
        assert_eq!(config.max_age, chrono::Duration::hours(24));
    }
}
