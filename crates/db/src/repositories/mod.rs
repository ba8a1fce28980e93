//! Stateless repositories. Each takes a `&PgPool` per call.

pub mod ledger_repo;
pub mod task_repo;

pub use ledger_repo::LedgerRepo;
pub use task_repo::TaskRepo;
