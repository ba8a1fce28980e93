//! Routes a task to the handler registered for its kind.
//!
//! The kind→handler map is fixed at construction. Everything that can go
//! wrong before or inside a handler (unknown kind, malformed payload,
//! missing handler, panic) comes back as a failed [`HandlerOutcome`]
//! rather than an error, so the scheduler has a single path to classify.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use retouch_core::handler::{HandlerOutcome, TaskHandler};
use retouch_core::retry::ErrorKind;
use retouch_core::task::{TaskKind, TaskPayload};
use retouch_db::models::task::Task;

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl Dispatcher {
    pub fn new(handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>) -> Self {
        Self { handlers }
    }

    /// Register (or replace) the handler for `kind`.
    pub fn with_handler(mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn supports(&self, kind: TaskKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Execute `task` with its handler.
    pub async fn dispatch(&self, task: &Task) -> HandlerOutcome {
        let payload = match TaskPayload::parse(&task.task_type, &task.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(task_id = task.id, task_type = %task.task_type, error = %e, "Rejecting task payload");
                return HandlerOutcome::failure(ErrorKind::Permanent, e.to_string());
            }
        };

        let Some(handler) = self.handlers.get(&payload.kind()) else {
            return HandlerOutcome::failure(
                ErrorKind::Permanent,
                format!("No handler registered for task type: {}", payload.kind()),
            );
        };

        let outcome = match AssertUnwindSafe(handler.execute(&payload))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(task_id = task.id, panic = %message, "Task handler panicked");
                return HandlerOutcome::unclassified(format!("Handler panicked: {message}"));
            }
        };

        if outcome.success && outcome.result_locator.is_none() {
            return HandlerOutcome::failure(
                ErrorKind::Transient,
                "Handler reported success without a result locator",
            );
        }
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
