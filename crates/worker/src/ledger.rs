//! PostgreSQL implementation of [`BalanceLedger`].

use retouch_core::error::CoreError;
use retouch_core::ledger::BalanceLedger;
use retouch_core::types::{Amount, DbId};
use retouch_db::repositories::LedgerRepo;
use retouch_db::DbPool;

/// Writes debits to `balance_ledger`; repeats with the same reference are
/// absorbed by the unique constraint.
#[derive(Clone)]
pub struct PgBalanceLedger {
    pool: DbPool,
}

impl PgBalanceLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BalanceLedger for PgBalanceLedger {
    async fn debit(
        &self,
        user_id: DbId,
        amount: Amount,
        reference_id: &str,
        description: &str,
    ) -> Result<(), CoreError> {
        let inserted = LedgerRepo::debit(&self.pool, user_id, amount, reference_id, description)
            .await
            .map_err(|e| CoreError::Internal(format!("Ledger debit failed: {e}")))?;
        if !inserted {
            tracing::info!(user_id, reference_id, "Debit already recorded, skipping");
        }
        Ok(())
    }
}
