//! Repository for the `balance_ledger` table.

use retouch_core::types::{Amount, DbId};
use sqlx::PgPool;

use crate::models::ledger::LedgerEntry;

/// Column list for `balance_ledger` queries.
const COLUMNS: &str = "id, user_id, amount, reference_id, description, created_at";

/// Provides idempotent debits and balance lookups.
pub struct LedgerRepo;

impl LedgerRepo {
    /// Record a debit of `amount` (a positive number) against `user_id`.
    ///
    /// Idempotent per `reference_id`: the unique constraint turns a repeat
    /// into a no-op. Returns `true` if a new entry was written.
    pub async fn debit(
        pool: &PgPool,
        user_id: DbId,
        amount: Amount,
        reference_id: &str,
        description: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO balance_ledger (user_id, amount, reference_id, description) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (reference_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(-amount.abs())
        .bind(reference_id)
        .bind(description)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sum of all ledger entries for a user.
    pub async fn balance(pool: &PgPool, user_id: DbId) -> Result<Amount, sqlx::Error> {
        sqlx::query_scalar::<_, Amount>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM balance_ledger WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Find the entry written for a reference, if any.
    pub async fn find_by_reference(
        pool: &PgPool,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM balance_ledger WHERE reference_id = $1");
        sqlx::query_as::<_, LedgerEntry>(&query)
            .bind(reference_id)
            .fetch_optional(pool)
            .await
    }
}
