//! Balance ledger entries.

use retouch_core::types::{Amount, DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `balance_ledger` table. Debits carry a negative amount.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: DbId,
    pub user_id: DbId,
    pub amount: Amount,
    /// Unique per charge, e.g. `task:42`.
    pub reference_id: String,
    pub description: String,
    pub created_at: Timestamp,
}
