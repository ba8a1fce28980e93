//! Repository for the `tasks` table.
//!
//! Uses `TaskStatus` from `models::status` for all status literals.
//! Every write replaces whole rows or single columns in one statement so
//! a concurrent reader never observes a half-applied transition.

use retouch_core::retry::DEFAULT_MAX_ATTEMPTS;
use retouch_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::status::{StatusId, TaskStatus};
use crate::models::task::{CreateTask, Task};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, task_type, status_id, payload, attempt_count, max_attempts, cost, \
    user_id, photo_id, chat_id, result_locator, error_message, user_message, \
    next_eligible_at, retry_of_task_id, charged_at, \
    created_at, updated_at, completed_at";

/// Terminal statuses: completed, failed, blocked.
const TERMINAL_STATUSES: [StatusId; 3] = [
    TaskStatus::Completed as StatusId,
    TaskStatus::Failed as StatusId,
    TaskStatus::Blocked as StatusId,
];

/// Upper bound on ids returned by the housekeeping listings.
const STALE_LIST_LIMIT: i64 = 50;

/// Provides queue operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Enqueue a new pending task.
    pub async fn create(pool: &PgPool, input: &CreateTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                 (task_type, status_id, payload, max_attempts, cost, user_id, photo_id, chat_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.task_type)
            .bind(TaskStatus::Pending.id())
            .bind(&input.payload)
            .bind(input.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
            .bind(input.cost)
            .bind(input.user_id)
            .bind(input.photo_id)
            .bind(input.chat_id)
            .fetch_one(pool)
            .await
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Select up to `limit` tasks the scheduler may start at `now`,
    /// oldest first.
    ///
    /// A task qualifies when it is pending, or pending retry with its
    /// `next_eligible_at` reached, was created within `max_age`, and still
    /// has attempts left.
    pub async fn select_eligible(
        pool: &PgPool,
        now: Timestamp,
        max_age: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE status_id IN ($1, $2) \
               AND (status_id = $1 OR next_eligible_at <= $3) \
               AND created_at >= $4 \
               AND attempt_count < max_attempts \
             ORDER BY created_at ASC, id ASC \
             LIMIT $5"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::PendingRetry.id())
            .bind(now)
            .bind(now - max_age)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Write every mutable column of `task` in one statement.
    ///
    /// Returns `RowNotFound` if the task no longer exists.
    pub async fn persist(pool: &PgPool, task: &Task) -> Result<(), sqlx::Error> {
        if Self::write_row(pool, task, None).await? {
            Ok(())
        } else {
            Err(sqlx::Error::RowNotFound)
        }
    }

    /// Write the outcome of an attempt, but only while the stored row is
    /// still `processing`. Returns `false` if the row is gone or has moved
    /// on to another status.
    pub async fn persist_outcome(pool: &PgPool, task: &Task) -> Result<bool, sqlx::Error> {
        Self::write_row(pool, task, Some(TaskStatus::Processing.id())).await
    }

    /// Move a pending or pending-retry task into `processing` with the
    /// attempt counter `task` carries.
    ///
    /// The stored row must still hold the previous attempt count, so two
    /// workers holding the same snapshot cannot both start the attempt.
    /// Returns `false` if the row was claimed or changed first.
    pub async fn claim(pool: &PgPool, task: &Task) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET \
                 status_id = $2, attempt_count = $3, \
                 next_eligible_at = NULL, updated_at = $4 \
             WHERE id = $1 AND status_id IN ($5, $6) AND attempt_count = $7",
        )
        .bind(task.id)
        .bind(TaskStatus::Processing.id())
        .bind(task.attempt_count)
        .bind(task.updated_at)
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::PendingRetry.id())
        .bind(task.attempt_count - 1)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn write_row(
        pool: &PgPool,
        task: &Task,
        only_from: Option<StatusId>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET \
                 status_id = $2, payload = $3, attempt_count = $4, \
                 result_locator = $5, error_message = $6, user_message = $7, \
                 next_eligible_at = $8, charged_at = $9, \
                 updated_at = $10, completed_at = $11 \
             WHERE id = $1 AND ($12::smallint IS NULL OR status_id = $12)",
        )
        .bind(task.id)
        .bind(task.status_id)
        .bind(&task.payload)
        .bind(task.attempt_count)
        .bind(&task.result_locator)
        .bind(&task.error_message)
        .bind(&task.user_message)
        .bind(task.next_eligible_at)
        .bind(task.charged_at)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .bind(only_from)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the charged marker. Returns `false` if it was already set.
    pub async fn mark_charged(
        pool: &PgPool,
        task_id: DbId,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET charged_at = $2, updated_at = $2 \
             WHERE id = $1 AND charged_at IS NULL",
        )
        .bind(task_id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Create a new pending task from a failed task's parameters.
    ///
    /// The new task has `retry_of_task_id` pointing to the original and is
    /// never charged. Returns `None` if the original does not exist or is
    /// not `failed`.
    pub async fn resubmit(pool: &PgPool, task_id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                 (task_type, status_id, payload, max_attempts, cost, \
                  user_id, photo_id, chat_id, retry_of_task_id) \
             SELECT task_type, $2, payload, max_attempts, cost, \
                    user_id, photo_id, chat_id, id \
             FROM tasks WHERE id = $1 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Failed.id())
            .fetch_optional(pool)
            .await
    }

    /// Delete terminal tasks that finished before `cutoff`.
    pub async fn delete_terminal_older_than(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM tasks \
             WHERE status_id IN ($1, $2, $3) AND completed_at < $4",
        )
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// IDs of tasks that entered `processing` before `cutoff` and never
    /// left it, most likely because the worker crashed mid-execution.
    pub async fn stale_processing_ids(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM tasks \
             WHERE status_id = $1 AND updated_at < $2 \
             ORDER BY updated_at ASC \
             LIMIT $3",
        )
        .bind(TaskStatus::Processing.id())
        .bind(cutoff)
        .bind(STALE_LIST_LIMIT)
        .fetch_all(pool)
        .await
    }

    /// IDs of pending or pending-retry tasks created before `cutoff`.
    ///
    /// The scheduler no longer selects them, so they stay put until an
    /// operator resubmits or removes them.
    pub async fn expired_waiting_ids(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM tasks \
             WHERE status_id IN ($1, $2) AND created_at < $3 \
             ORDER BY created_at ASC \
             LIMIT $4",
        )
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::PendingRetry.id())
        .bind(cutoff)
        .bind(STALE_LIST_LIMIT)
        .fetch_all(pool)
        .await
    }
}
