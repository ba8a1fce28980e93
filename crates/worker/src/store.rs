//! The Task Store seam.
//!
//! [`TaskStore`] is the scheduler's only view of durable state.
//! [`PgTaskStore`] implements it over [`TaskRepo`]; tests and local runs
//! use [`MemoryTaskStore`](crate::memory::MemoryTaskStore).

use retouch_core::types::{DbId, Timestamp};
use retouch_db::models::task::Task;
use retouch_db::repositories::TaskRepo;
use retouch_db::DbPool;

/// Errors from the Task Store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task {0} not found")]
    NotFound(DbId),

    #[error("Task {0} is no longer processing")]
    Conflict(DbId),

    #[error("Task store unavailable: {0}")]
    Unavailable(String),
}

/// Durable record of tasks and their state.
///
/// Every method is atomic per task: a concurrent reader never sees a
/// partially written record.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// Tasks the scheduler may start at `now`, oldest first, at most
    /// `limit` of them.
    async fn select_eligible(
        &self,
        now: Timestamp,
        max_age: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;

    /// Start an attempt: write `task` (already `processing`, with its
    /// attempt counter bumped) over a stored record that is still pending
    /// or pending retry at the previous attempt count.
    ///
    /// Returns `false` if another execution claimed the record first.
    async fn claim(&self, task: &Task) -> Result<bool, StoreError>;

    /// Replace the stored record with the outcome in `task`.
    ///
    /// Fails with [`StoreError::Conflict`] unless the stored record is
    /// `processing`.
    async fn persist(&self, task: &Task) -> Result<(), StoreError>;

    /// Set the charged marker. Returns `false` if it was already set.
    async fn mark_charged(&self, task_id: DbId, at: Timestamp) -> Result<bool, StoreError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TaskStore for PgTaskStore {
    async fn select_eligible(
        &self,
        now: Timestamp,
        max_age: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(TaskRepo::select_eligible(&self.pool, now, max_age, limit).await?)
    }

    async fn claim(&self, task: &Task) -> Result<bool, StoreError> {
        Ok(TaskRepo::claim(&self.pool, task).await?)
    }

    async fn persist(&self, task: &Task) -> Result<(), StoreError> {
        if TaskRepo::persist_outcome(&self.pool, task).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict(task.id))
        }
    }

    async fn mark_charged(&self, task_id: DbId, at: Timestamp) -> Result<bool, StoreError> {
        Ok(TaskRepo::mark_charged(&self.pool, task_id, at).await?)
    }
}
