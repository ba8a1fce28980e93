//! Shared fakes and a scheduler harness for worker integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use retouch_core::clock::{Clock, ManualClock};
use retouch_core::error::CoreError;
use retouch_core::handler::{HandlerOutcome, TaskHandler};
use retouch_core::ledger::BalanceLedger;
use retouch_core::notify::{Notification, Notifier};
use retouch_core::task::{TaskKind, TaskPayload};
use retouch_core::types::{Amount, DbId, Timestamp};
use retouch_db::models::status::StatusId;
use retouch_db::models::task::CreateTask;
use serde_json::json;
use tokio::sync::Semaphore;

use retouch_worker::coordinator::SideEffectCoordinator;
use retouch_worker::dispatcher::Dispatcher;
use retouch_worker::memory::MemoryTaskStore;
use retouch_worker::scheduler::{SchedulerConfig, SchedulerDeps, TaskScheduler};
use retouch_worker::store::TaskStore;

pub fn start_time() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// A chargeable restore request owned by user 7, notified on chat 70.
pub fn restore_request() -> CreateTask {
    CreateTask {
        task_type: "restore".into(),
        payload: json!({"source_url": "https://cdn.test/in/1.jpg"}),
        cost: 150,
        max_attempts: None,
        user_id: Some(7),
        photo_id: Some(11),
        chat_id: Some(70),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Returns queued outcomes in order, then succeeds.
#[derive(Default)]
pub struct ScriptedHandler {
    outcomes: Mutex<VecDeque<HandlerOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(outcomes: impl IntoIterator<Item = HandlerOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TaskHandler for ScriptedHandler {
    async fn execute(&self, _payload: &TaskPayload) -> HandlerOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| HandlerOutcome::success(format!("https://cdn.test/out/{n}.png")))
    }
}

/// Succeeds only once a permit is released; counts executions started.
pub struct BlockingHandler {
    permits: Semaphore,
    started: AtomicUsize,
}

impl BlockingHandler {
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Wait (bounded) until `n` executions are parked in the handler.
    pub async fn wait_started(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("executions did not start in time");
    }
}

#[async_trait::async_trait]
impl TaskHandler for BlockingHandler {
    async fn execute(&self, _payload: &TaskPayload) -> HandlerOutcome {
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let permit = self.permits.acquire().await.unwrap();
        permit.forget();
        HandlerOutcome::success(format!("https://cdn.test/out/{n}.png"))
    }
}

// ---------------------------------------------------------------------------
// Side-effect fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Debit {
    pub user_id: DbId,
    pub amount: Amount,
    pub reference_id: String,
}

#[derive(Default)]
pub struct RecordingLedger {
    debits: Mutex<Vec<Debit>>,
    failing: AtomicBool,
}

impl RecordingLedger {
    pub fn debits(&self) -> Vec<Debit> {
        self.debits.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl BalanceLedger for RecordingLedger {
    async fn debit(
        &self,
        user_id: DbId,
        amount: Amount,
        reference_id: &str,
        _description: &str,
    ) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Internal("ledger offline".into()));
        }
        self.debits.lock().unwrap().push(Debit {
            user_id,
            amount,
            reference_id: reference_id.to_string(),
        });
        Ok(())
    }
}

/// Records every notification together with the persisted status of the
/// notified task at delivery time.
pub struct RecordingNotifier {
    store: Arc<MemoryTaskStore>,
    sent: Mutex<Vec<(Notification, Vec<StatusId>)>>,
}

impl RecordingNotifier {
    pub fn new(store: Arc<MemoryTaskStore>) -> Self {
        Self {
            store,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Status ids of the recipient's tasks as stored when each message went out.
    pub fn statuses_at_send(&self) -> Vec<Vec<StatusId>> {
        self.sent.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        let statuses = self
            .store
            .all()
            .into_iter()
            .filter(|t| t.chat_id == Some(notification.recipient_id))
            .map(|t| t.status_id)
            .collect();
        self.sent
            .lock()
            .unwrap()
            .push((notification.clone(), statuses));
        true
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryTaskStore>,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<RecordingLedger>,
    pub notifier: Arc<RecordingNotifier>,
    pub scheduler: Arc<TaskScheduler>,
}

impl Harness {
    /// Build a scheduler whose restore tasks go to `handler`.
    pub fn new(handler: Arc<dyn TaskHandler>, max_concurrent: usize) -> Self {
        let store = Arc::new(MemoryTaskStore::new());
        Self::with_store(store.clone(), store, handler, max_concurrent)
    }

    /// Like [`Harness::new`] but the scheduler talks to `scheduler_store`,
    /// which must wrap `store`.
    pub fn with_store(
        store: Arc<MemoryTaskStore>,
        scheduler_store: Arc<dyn TaskStore>,
        handler: Arc<dyn TaskHandler>,
        max_concurrent: usize,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let ledger = Arc::new(RecordingLedger::default());
        let notifier = Arc::new(RecordingNotifier::new(store.clone()));
        let coordinator = Arc::new(SideEffectCoordinator::new(
            scheduler_store.clone(),
            ledger.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let scheduler = TaskScheduler::new(
            SchedulerDeps {
                store: scheduler_store,
                dispatcher: Arc::new(Dispatcher::default().with_handler(TaskKind::Restore, handler)),
                coordinator,
                clock: clock.clone(),
            },
            SchedulerConfig {
                tick_interval: Duration::from_millis(20),
                max_concurrent,
                max_age: chrono::Duration::hours(24),
            },
        );
        Self {
            store,
            clock,
            ledger,
            notifier,
            scheduler,
        }
    }

    pub fn enqueue(&self, request: CreateTask) -> DbId {
        self.store.insert(request, self.clock.now()).id
    }

    /// Tick once and wait for every execution that tick admitted.
    pub async fn tick_and_drain(&self) -> usize {
        let admitted = self.scheduler.tick().await;
        self.scheduler.drain().await;
        admitted
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}
