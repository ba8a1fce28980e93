//! In-memory [`TaskStore`] for tests and database-less local runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use retouch_core::retry::DEFAULT_MAX_ATTEMPTS;
use retouch_core::types::{DbId, Timestamp};
use retouch_db::models::status::{StatusId, TaskStatus};
use retouch_db::models::task::{CreateTask, Task};

use crate::store::{StoreError, TaskStore};

#[derive(Debug, Default)]
struct Inner {
    next_id: DbId,
    tasks: BTreeMap<DbId, Task>,
    /// Every persisted `(task_id, status_id)` in write order.
    writes: Vec<(DbId, StatusId)>,
}

/// A `BTreeMap`-backed task store with the same selection rules as the
/// `tasks` table.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a pending task created at `now`.
    pub fn insert(&self, input: CreateTask, now: Timestamp) -> Task {
        let mut inner = self.lock();
        inner.next_id += 1;
        let task = Task {
            id: inner.next_id,
            task_type: input.task_type,
            status_id: TaskStatus::Pending.id(),
            payload: input.payload,
            attempt_count: 0,
            max_attempts: input.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            cost: input.cost,
            user_id: input.user_id,
            photo_id: input.photo_id,
            chat_id: input.chat_id,
            result_locator: None,
            error_message: None,
            user_message: None,
            next_eligible_at: None,
            retry_of_task_id: None,
            charged_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        inner.tasks.insert(task.id, task.clone());
        task
    }

    /// Overwrite a stored task without recording a write, for test setup.
    pub fn put(&self, task: Task) {
        self.lock().tasks.insert(task.id, task);
    }

    pub fn get(&self, task_id: DbId) -> Option<Task> {
        self.lock().tasks.get(&task_id).cloned()
    }

    pub fn all(&self) -> Vec<Task> {
        self.lock().tasks.values().cloned().collect()
    }

    /// Every persisted `(task_id, status_id)` in write order.
    pub fn writes(&self) -> Vec<(DbId, StatusId)> {
        self.lock().writes.clone()
    }

    /// Make every store call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl TaskStore for MemoryTaskStore {
    async fn select_eligible(
        &self,
        now: Timestamp,
        max_age: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        self.check_available()?;
        let inner = self.lock();
        let mut eligible: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.is_eligible(now, max_age))
            .cloned()
            .collect();
        eligible.sort_by_key(|t| (t.created_at, t.id));
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn claim(&self, task: &Task) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        let stored = inner
            .tasks
            .get_mut(&task.id)
            .ok_or(StoreError::NotFound(task.id))?;
        let claimable = matches!(
            stored.status(),
            Some(TaskStatus::Pending | TaskStatus::PendingRetry)
        ) && stored.attempt_count == task.attempt_count - 1;
        if !claimable {
            return Ok(false);
        }
        stored.status_id = TaskStatus::Processing.id();
        stored.attempt_count = task.attempt_count;
        stored.next_eligible_at = None;
        stored.updated_at = task.updated_at;
        inner.writes.push((task.id, TaskStatus::Processing.id()));
        Ok(true)
    }

    async fn persist(&self, task: &Task) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        let stored = inner
            .tasks
            .get_mut(&task.id)
            .ok_or(StoreError::NotFound(task.id))?;
        if stored.status() != Some(TaskStatus::Processing) {
            return Err(StoreError::Conflict(task.id));
        }
        *stored = task.clone();
        inner.writes.push((task.id, task.status_id));
        Ok(())
    }

    async fn mark_charged(&self, task_id: DbId, at: Timestamp) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::NotFound(task_id))?;
        if task.charged_at.is_some() {
            return Ok(false);
        }
        task.charged_at = Some(at);
        task.updated_at = at;
        Ok(true)
    }
}
