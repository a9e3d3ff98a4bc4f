//! Points ledger - the only writer of account balances
//!
//! Every transaction starts pending and leaves pending at most once. A call
//! that finds the transaction already resolved returns `false` and changes
//! nothing, which is what makes racing confirm/cancel callers harmless.

use std::sync::Arc;

use uuid::Uuid;

use crate::adapters::duckdb::{DuckDbRepository, Transition};
use crate::domain::result::{Error, Result};
use crate::domain::{PointAccount, PointsTransaction, TransactionFilter, TransactionStatus};

pub struct PointsLedger {
    repository: Arc<DuckDbRepository>,
}

fn db_err(e: anyhow::Error) -> Error {
    Error::database(format!("{:#}", e))
}

impl PointsLedger {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Record a pending award and credit the account's pending balance
    ///
    /// Non-positive amounts fail with [`Error::InvalidAmount`] before anything
    /// is written. The account is created on first use.
    pub fn add(
        &self,
        account_id: &str,
        amount: i64,
        reason: &str,
        reference_id: Option<Uuid>,
    ) -> Result<Uuid> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        PointAccount::validate_id(account_id).map_err(Error::validation)?;
        if reason.trim().is_empty() {
            return Err(Error::validation("reason cannot be empty"));
        }

        let tx = PointsTransaction::new_pending(account_id.trim(), amount, reason.trim(), reference_id);
        self.repository.add_pending_transaction(&tx).map_err(db_err)?;

        tracing::info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            amount,
            reason = %tx.reason,
            "points added as pending"
        );
        Ok(tx.id)
    }

    /// Pending to Confirmed; moves the amount from pending to confirmed
    pub fn confirm(&self, transaction_id: Uuid) -> Result<bool> {
        self.resolve(transaction_id, TransactionStatus::Confirmed)
    }

    /// Pending to Cancelled; removes the amount from pending
    pub fn cancel(&self, transaction_id: Uuid) -> Result<bool> {
        self.resolve(transaction_id, TransactionStatus::Cancelled)
    }

    fn resolve(&self, transaction_id: Uuid, target: TransactionStatus) -> Result<bool> {
        let transition = self
            .repository
            .resolve_transaction(transaction_id, target)
            .map_err(db_err)?;

        match transition {
            Transition::Applied => {
                tracing::info!(%transaction_id, status = %target, "transaction resolved");
                Ok(true)
            }
            Transition::AlreadyResolved(current) => {
                tracing::debug!(%transaction_id, %current, requested = %target, "already resolved");
                Ok(false)
            }
            Transition::Missing => Err(Error::not_found(format!(
                "transaction {}",
                transaction_id
            ))),
        }
    }

    pub fn get(&self, transaction_id: Uuid) -> Result<Option<PointsTransaction>> {
        self.repository.get_transaction(transaction_id).map_err(db_err)
    }

    /// Balance for an account; zeroed if it has never earned anything
    pub fn account(&self, account_id: &str) -> Result<PointAccount> {
        Ok(self
            .repository
            .get_account(account_id.trim())
            .map_err(db_err)?
            .unwrap_or_else(|| PointAccount::empty(account_id.trim())))
    }

    /// Transactions in one status, oldest first
    pub fn list_by_status(
        &self,
        status: TransactionStatus,
        filter: &TransactionFilter,
    ) -> Result<Vec<PointsTransaction>> {
        self.repository.list_transactions(status, filter).map_err(db_err)
    }

    pub fn count_by_status(&self, status: TransactionStatus, filter: &TransactionFilter) -> Result<i64> {
        self.repository.count_transactions(status, filter).map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::REASON_PRICE_SUBMISSION;

    fn ledger() -> PointsLedger {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        PointsLedger::new(Arc::new(repo))
    }

    #[test]
    fn test_invalid_amount_writes_nothing() {
        let ledger = ledger();
        for amount in [0, -5] {
            let err = ledger.add("user-1", amount, REASON_PRICE_SUBMISSION, None).unwrap_err();
            assert!(matches!(err, Error::InvalidAmount(a) if a == amount));
        }
        assert_eq!(ledger.account("user-1").unwrap().total_points(), 0);
        assert_eq!(
            ledger
                .count_by_status(TransactionStatus::Pending, &TransactionFilter::default())
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_confirm_then_cancel() {
        let ledger = ledger();
        let id = ledger.add("user-1", 5, REASON_PRICE_SUBMISSION, None).unwrap();
        assert_eq!(ledger.account("user-1").unwrap().pending_points, 5);

        assert!(ledger.confirm(id).unwrap());
        assert!(!ledger.confirm(id).unwrap());
        assert!(!ledger.cancel(id).unwrap());

        let account = ledger.account("user-1").unwrap();
        assert_eq!((account.pending_points, account.confirmed_points), (0, 5));
        let tx = ledger.get(id).unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert!(tx.resolved_at.is_some());
    }

    #[test]
    fn test_cancel_only_drops_pending() {
        let ledger = ledger();
        let keep = ledger.add("user-1", 5, REASON_PRICE_SUBMISSION, None).unwrap();
        let drop = ledger.add("user-1", 3, REASON_PRICE_SUBMISSION, None).unwrap();
        ledger.confirm(keep).unwrap();

        assert!(ledger.cancel(drop).unwrap());
        assert!(!ledger.confirm(drop).unwrap());

        let account = ledger.account("user-1").unwrap();
        assert_eq!((account.pending_points, account.confirmed_points), (0, 5));
    }

    #[test]
    fn test_unknown_transaction_is_not_found() {
        let ledger = ledger();
        let err = ledger.confirm(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_account_defaults_to_zero() {
        let ledger = ledger();
        let account = ledger.account("nobody").unwrap();
        assert_eq!(account.account_id, "nobody");
        assert_eq!(account.total_points(), 0);
    }

    #[test]
    fn test_rejects_blank_account_and_reason() {
        let ledger = ledger();
        assert!(matches!(
            ledger.add("  ", 5, REASON_PRICE_SUBMISSION, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ledger.add("user-1", 5, " ", None),
            Err(Error::Validation(_))
        ));
    }
}
