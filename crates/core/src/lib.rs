//! Domain logic for the retouch task queue.
//!
//! This crate has zero internal dependencies so that the database layer,
//! the vendor handlers, the notification channel and the worker can all
//! share the same task vocabulary:
//!
//! - [`task`]: task kinds and the per-kind payload union.
//! - [`task_state`]: the status state machine.
//! - [`retry`]: backoff table and outcome classification.
//! - [`messages`]: user-facing translations of failures.
//! - [`handler`], [`notify`], [`ledger`]: capability traits implemented
//!   by external collaborators.
//! - [`clock`]: injectable time source.

pub mod clock;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod messages;
pub mod notify;
pub mod retry;
pub mod task;
pub mod task_state;
pub mod types;
