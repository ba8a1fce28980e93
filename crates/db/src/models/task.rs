//! Task entity models and DTOs for the task queue.

use retouch_core::task::TaskKind;
use retouch_core::types::{Amount, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub task_type: String,
    pub status_id: StatusId,
    pub payload: serde_json::Value,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub cost: Amount,
    pub user_id: Option<DbId>,
    pub photo_id: Option<DbId>,
    pub chat_id: Option<i64>,
    pub result_locator: Option<String>,
    /// Last raw error, kept for diagnostics.
    pub error_message: Option<String>,
    /// Last translated message shown to the user.
    pub user_message: Option<String>,
    pub next_eligible_at: Option<Timestamp>,
    pub retry_of_task_id: Option<DbId>,
    /// Set once the task's cost has been debited.
    pub charged_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Task {
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }

    pub fn kind(&self) -> Option<TaskKind> {
        TaskKind::parse(&self.task_type)
    }

    /// Whether the scheduler may pick this task up at `now`.
    ///
    /// Mirrors the `WHERE` clause of `TaskRepo::select_eligible` so that
    /// in-memory stores select exactly what the database would.
    pub fn is_eligible(&self, now: Timestamp, max_age: chrono::Duration) -> bool {
        let ready = match self.status() {
            Some(TaskStatus::Pending) => true,
            Some(TaskStatus::PendingRetry) => self.next_eligible_at.is_some_and(|at| at <= now),
            _ => false,
        };
        ready && self.created_at >= now - max_age && self.attempt_count < self.max_attempts
    }

    /// Whether completing this task should debit its owner.
    ///
    /// Decided from persisted state only: a task that was already charged,
    /// or that was resubmitted from a failed one, is never charged again.
    pub fn is_chargeable(&self) -> bool {
        self.charged_at.is_none() && self.retry_of_task_id.is_none() && self.cost > 0
    }
}

/// DTO for enqueueing a new task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub task_type: String,
    pub payload: serde_json::Value,
    pub cost: Amount,
    /// Defaults to `retry::DEFAULT_MAX_ATTEMPTS`.
    pub max_attempts: Option<i32>,
    pub user_id: Option<DbId>,
    pub photo_id: Option<DbId>,
    pub chat_id: Option<i64>,
}
