//! Balance ledger interface.

use crate::error::CoreError;
use crate::types::{Amount, DbId};

/// Debits user balances for completed work.
///
/// Implementations must be idempotent per `reference_id`: a second call
/// with the same reference is a no-op, not a second charge.
#[async_trait::async_trait]
pub trait BalanceLedger: Send + Sync {
    async fn debit(
        &self,
        user_id: DbId,
        amount: Amount,
        reference_id: &str,
        description: &str,
    ) -> Result<(), CoreError>;
}

/// Ledger reference for the charge of a task.
pub fn task_reference(task_id: DbId) -> String {
    format!("task:{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_embeds_task_id() {
        assert_eq!(task_reference(42), "task:42");
    }
}
