//! Notification sender interface.

use serde::Serialize;

use crate::task::TaskKind;

/// A terminal-outcome message addressed to the task's owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Chat (or user) id the message is delivered to.
    pub recipient_id: i64,
    pub task_kind: Option<TaskKind>,
    pub result_locator: Option<String>,
    pub success: bool,
    /// Translated, user-facing text.
    pub message: Option<String>,
}

/// Best-effort delivery of task outcomes to users.
///
/// Returns `false` when delivery failed; callers log and move on.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> bool;
}
