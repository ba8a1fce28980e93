//! Task scheduler: the polling loop and the per-task state machine.
//!
//! Polls the Task Store every `tick_interval`, admits as many eligible
//! tasks as the [`ConcurrencyGate`] allows, and spawns one execution per
//! admitted task. The loop never waits on an execution; each one writes
//! its outcome to the store and then hands terminal outcomes to the
//! [`SideEffectCoordinator`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use retouch_core::clock::Clock;
use retouch_core::handler::HandlerOutcome;
use retouch_core::messages;
use retouch_core::retry::{self, ErrorKind, RetryDecision};
use retouch_core::task_state;
use retouch_db::models::status::TaskStatus;
use retouch_db::models::task::Task;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::coordinator::SideEffectCoordinator;
use crate::dispatcher::Dispatcher;
use crate::gate::{ConcurrencyGate, GatePermit, DEFAULT_MAX_CONCURRENT};
use crate::store::{StoreError, TaskStore};

/// Default polling interval for the scheduler loop.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Default maximum age of a task still worth starting.
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub max_concurrent: usize,
    /// Tasks created longer ago than this are never selected.
    pub max_age: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_age: chrono::Duration::hours(DEFAULT_MAX_AGE_HOURS),
        }
    }
}

/// Read-only snapshot for external monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub is_processing_tick: bool,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub tick_interval_ms: u64,
}

/// Collaborators the scheduler is built from.
pub struct SchedulerDeps {
    pub store: Arc<dyn TaskStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub coordinator: Arc<SideEffectCoordinator>,
    pub clock: Arc<dyn Clock>,
}

/// Single long-lived scheduler, shared via `Arc`.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<Dispatcher>,
    coordinator: Arc<SideEffectCoordinator>,
    clock: Arc<dyn Clock>,
    gate: ConcurrencyGate,
    config: SchedulerConfig,
    is_processing_tick: AtomicBool,
    executions: TaskTracker,
}

impl TaskScheduler {
    pub fn new(deps: SchedulerDeps, config: SchedulerConfig) -> Arc<Self> {
        Arc::new(Self {
            store: deps.store,
            dispatcher: deps.dispatcher,
            coordinator: deps.coordinator,
            clock: deps.clock,
            gate: ConcurrencyGate::new(config.max_concurrent),
            config,
            is_processing_tick: AtomicBool::new(false),
            executions: TaskTracker::new(),
        })
    }

    /// Run the scheduler loop until the cancellation token is triggered.
    ///
    /// Executions already admitted keep running after the loop exits; use
    /// [`drain`](Self::drain) to wait for them.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            max_concurrent = self.config.max_concurrent,
            max_age_hours = self.config.max_age.num_hours(),
            "Task scheduler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Task scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One scheduling cycle. Returns the number of tasks admitted.
    ///
    /// A tick that starts while another tick is still selecting does
    /// nothing.
    pub async fn tick(self: &Arc<Self>) -> usize {
        if self
            .is_processing_tick
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Previous tick still selecting, skipping");
            return 0;
        }
        let _guard = TickGuard(&self.is_processing_tick);

        let capacity = self.gate.free_capacity();
        if capacity == 0 {
            tracing::debug!(in_flight = self.gate.in_flight(), "No free capacity");
            return 0;
        }

        let now = self.clock.now();
        let tasks = match self
            .store
            .select_eligible(now, self.config.max_age, capacity)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to select eligible tasks");
                return 0;
            }
        };

        let mut admitted = 0;
        for task in tasks {
            match self.gate.try_admit(task.id) {
                Ok(permit) => {
                    let this = Arc::clone(self);
                    self.executions.spawn(async move {
                        this.execute(task, permit).await;
                    });
                    admitted += 1;
                }
                Err(e) => {
                    tracing::debug!(task_id = task.id, reason = %e, "Task not admitted");
                }
            }
        }

        if admitted > 0 {
            tracing::info!(admitted, in_flight = self.gate.in_flight(), "Tasks admitted");
        }
        admitted
    }

    /// Current occupancy and configuration.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            is_processing_tick: self.is_processing_tick.load(Ordering::Acquire),
            in_flight: self.gate.in_flight(),
            max_concurrent: self.gate.max_concurrent(),
            tick_interval_ms: self.config.tick_interval.as_millis() as u64,
        }
    }

    /// Wait until every admitted execution has finished.
    pub async fn drain(&self) {
        self.executions.close();
        self.executions.wait().await;
        self.executions.reopen();
    }

    /// Run one attempt of `task` while holding its gate slot.
    async fn execute(&self, mut task: Task, _permit: GatePermit) {
        let now = self.clock.now();
        if let Err(msg) = transition(&mut task, TaskStatus::Processing) {
            tracing::warn!(task_id = task.id, error = %msg, "Refusing to start task");
            return;
        }
        task.attempt_count += 1;
        task.next_eligible_at = None;
        task.updated_at = now;

        match self.store.claim(&task).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(task_id = task.id, "Task already claimed, skipping stale copy");
                return;
            }
            Err(e) => {
                tracing::error!(task_id = task.id, error = %e, "Failed to mark task processing");
                return;
            }
        }
        tracing::info!(
            task_id = task.id,
            task_type = %task.task_type,
            attempt = task.attempt_count,
            max_attempts = task.max_attempts,
            "Task processing",
        );

        let outcome = self.dispatcher.dispatch(&task).await;
        self.finish(task, outcome).await;
    }

    /// Persist the outcome of an attempt, then run terminal side effects.
    async fn finish(&self, mut task: Task, outcome: HandlerOutcome) {
        let now = self.clock.now();
        task.updated_at = now;

        if outcome.success {
            if let Err(msg) = transition(&mut task, TaskStatus::Completed) {
                tracing::error!(task_id = task.id, error = %msg, "Illegal completion");
                return;
            }
            task.result_locator = outcome.result_locator;
            task.user_message = None;
            task.completed_at = Some(now);
            if !self.persist_outcome(&task).await {
                return;
            }
            tracing::info!(task_id = task.id, attempt = task.attempt_count, "Task completed");
            self.coordinator.on_completed(&task).await;
            return;
        }

        let detail = outcome
            .error_detail
            .unwrap_or_else(|| "Unknown error".to_string());
        let kind = ErrorKind::resolve(outcome.error_kind, &detail);
        let decision = retry::classify(task.attempt_count, task.max_attempts, kind);

        task.error_message = Some(detail);
        task.user_message = Some(messages::failure_message(task.kind(), kind));

        let target = match decision {
            RetryDecision::Retry { .. } => TaskStatus::PendingRetry,
            RetryDecision::FailTerminal => TaskStatus::Failed,
            RetryDecision::BlockTerminal(_) => TaskStatus::Blocked,
        };
        if let Err(msg) = transition(&mut task, target) {
            tracing::error!(task_id = task.id, error = %msg, "Illegal failure transition");
            return;
        }

        match decision {
            RetryDecision::Retry { delay } => {
                let delay = chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(retry::BACKOFF_TABLE_SECS[0] as i64));
                task.next_eligible_at = Some(now + delay);
                if self.persist_outcome(&task).await {
                    tracing::warn!(
                        task_id = task.id,
                        attempt = task.attempt_count,
                        retry_in_secs = delay.num_seconds(),
                        error = task.error_message.as_deref(),
                        "Task attempt failed, retry scheduled",
                    );
                }
            }
            RetryDecision::FailTerminal | RetryDecision::BlockTerminal(_) => {
                task.completed_at = Some(now);
                if !self.persist_outcome(&task).await {
                    return;
                }
                tracing::warn!(
                    task_id = task.id,
                    status = TaskStatus::from_id(task.status_id).map(TaskStatus::name),
                    attempt = task.attempt_count,
                    error = task.error_message.as_deref(),
                    "Task terminated",
                );
                self.coordinator.on_terminal_failure(&task).await;
            }
        }
    }

    async fn persist_outcome(&self, task: &Task) -> bool {
        match self.store.persist(task).await {
            Ok(()) => true,
            Err(e @ StoreError::Conflict(_)) => {
                tracing::warn!(
                    task_id = task.id,
                    status_id = task.status_id,
                    error = %e,
                    "Task outcome discarded",
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    task_id = task.id,
                    status_id = task.status_id,
                    error = %e,
                    "Failed to persist task outcome; task left in processing",
                );
                false
            }
        }
    }
}

/// Apply a status change if the state machine allows it.
fn transition(task: &mut Task, to: TaskStatus) -> Result<(), String> {
    task_state::validate_transition(task.status_id, to.id())?;
    task.status_id = to.id();
    Ok(())
}

/// Clears the processing-tick flag when the tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
