pub mod ledger;
pub mod status;
pub mod task;
