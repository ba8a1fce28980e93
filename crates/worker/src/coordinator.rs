//! Side effects of terminal task outcomes: balance debit and user
//! notification.
//!
//! Callers must persist the terminal status before invoking the
//! coordinator. Nothing here can change that status: debit and delivery
//! failures are logged and reported, never propagated.

use std::sync::Arc;

use retouch_core::clock::Clock;
use retouch_core::ledger::{task_reference, BalanceLedger};
use retouch_core::messages;
use retouch_core::notify::{Notification, Notifier};
use retouch_db::models::task::Task;

use crate::store::TaskStore;

/// What the coordinator managed to do for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideEffectReport {
    pub debited: bool,
    pub notified: bool,
}

pub struct SideEffectCoordinator {
    store: Arc<dyn TaskStore>,
    ledger: Arc<dyn BalanceLedger>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl SideEffectCoordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        ledger: Arc<dyn BalanceLedger>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            clock,
        }
    }

    /// Debit (at most once) and send the success notification.
    pub async fn on_completed(&self, task: &Task) -> SideEffectReport {
        let debited = self.charge(task).await;
        let notified = self
            .send(task, true, task.result_locator.clone(), None)
            .await;
        SideEffectReport { debited, notified }
    }

    /// Send the failure notification. Never debits.
    pub async fn on_terminal_failure(&self, task: &Task) -> SideEffectReport {
        let notified = self
            .send(task, false, None, task.user_message.clone())
            .await;
        SideEffectReport {
            debited: false,
            notified,
        }
    }

    async fn charge(&self, task: &Task) -> bool {
        if !task.is_chargeable() {
            tracing::debug!(
                task_id = task.id,
                charged_at = ?task.charged_at,
                retry_of_task_id = task.retry_of_task_id,
                cost = task.cost,
                "Task not chargeable, skipping debit",
            );
            return false;
        }
        let Some(user_id) = task.user_id else {
            tracing::warn!(task_id = task.id, "Completed task has no owner to debit");
            return false;
        };

        let reference = task_reference(task.id);
        let label = task
            .kind()
            .map(messages::task_label)
            .unwrap_or("task");
        let description = format!("{label} (task {})", task.id);

        if let Err(e) = self
            .ledger
            .debit(user_id, task.cost, &reference, &description)
            .await
        {
            tracing::error!(task_id = task.id, user_id, error = %e, "Balance debit failed");
            return false;
        }

        // Ledger debits are idempotent per reference; the marker is the
        // persisted record that this task has been charged.
        match self.store.mark_charged(task.id, self.clock.now()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(task_id = task.id, "Charged marker was already set");
            }
            Err(e) => {
                tracing::error!(task_id = task.id, error = %e, "Failed to persist charged marker");
            }
        }

        tracing::info!(task_id = task.id, user_id, amount = task.cost, "Task debited");
        true
    }

    async fn send(
        &self,
        task: &Task,
        success: bool,
        result_locator: Option<String>,
        message: Option<String>,
    ) -> bool {
        let Some(recipient_id) = task.chat_id else {
            tracing::debug!(task_id = task.id, "No chat to notify");
            return false;
        };

        let notification = Notification {
            recipient_id,
            task_kind: task.kind(),
            result_locator,
            success,
            message,
        };
        let delivered = self.notifier.notify(&notification).await;
        if !delivered {
            tracing::warn!(task_id = task.id, recipient_id, success, "Notification not delivered");
        }
        delivered
    }
}
