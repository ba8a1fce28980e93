//! Task queue worker: scheduling, admission control, dispatch and
//! terminal side effects.
//!
//! - [`scheduler::TaskScheduler`]: the polling loop and per-task state
//!   machine.
//! - [`gate::ConcurrencyGate`]: bounds simultaneous executions.
//! - [`dispatcher::Dispatcher`]: routes a task to its handler.
//! - [`coordinator::SideEffectCoordinator`]: debit and notify on
//!   terminal outcomes.
//! - [`store`]: the Task Store seam, backed by PostgreSQL or memory.
//! - [`server`]: read-only health and stats endpoints.
//! - [`housekeeping`]: retention cleanup and stuck-task reporting.

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod gate;
pub mod housekeeping;
pub mod ledger;
pub mod memory;
pub mod scheduler;
pub mod server;
pub mod store;
