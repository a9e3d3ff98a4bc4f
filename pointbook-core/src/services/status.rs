//! Status service - ledger and submission summaries

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::{DuckDbRepository, StatusTotals};
use crate::domain::{PointAccount, TransactionStatus};

/// How many accounts the summary lists
pub const TOP_ACCOUNTS: usize = 10;

/// Status service for ledger summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let totals = self.repository.transaction_totals()?;
        let totals_for = |status: TransactionStatus| {
            totals
                .iter()
                .find(|t| t.status == status)
                .cloned()
                .unwrap_or(StatusTotals {
                    status,
                    count: 0,
                    points: 0,
                })
        };

        Ok(StatusSummary {
            total_accounts: self.repository.count_accounts()?,
            total_submissions: self.repository.count_submissions()?,
            total_stores: self.repository.list_stores()?.len() as i64,
            pending: totals_for(TransactionStatus::Pending),
            confirmed: totals_for(TransactionStatus::Confirmed),
            cancelled: totals_for(TransactionStatus::Cancelled),
            top_accounts: self
                .repository
                .list_accounts(Some(TOP_ACCOUNTS))?
                .into_iter()
                .map(AccountSummary::from)
                .collect(),
            db_size_bytes: self.repository.get_db_size()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_accounts: i64,
    pub total_submissions: i64,
    pub total_stores: i64,
    pub pending: StatusTotals,
    pub confirmed: StatusTotals,
    pub cancelled: StatusTotals,
    pub top_accounts: Vec<AccountSummary>,
    pub db_size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub account_id: String,
    pub pending_points: i64,
    pub confirmed_points: i64,
}

impl From<PointAccount> for AccountSummary {
    fn from(account: PointAccount) -> Self {
        Self {
            account_id: account.account_id,
            pending_points: account.pending_points,
            confirmed_points: account.confirmed_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PointsTransaction, Submission, REASON_PRICE_SUBMISSION};

    #[test]
    fn test_status_counts() {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();

        let a = PointsTransaction::new_pending("user-1", 5, REASON_PRICE_SUBMISSION, None);
        let b = PointsTransaction::new_pending("user-2", 3, REASON_PRICE_SUBMISSION, None);
        repo.add_pending_transaction(&a).unwrap();
        repo.add_pending_transaction(&b).unwrap();
        repo.resolve_transaction(a.id, TransactionStatus::Confirmed).unwrap();
        repo.insert_submission(&Submission::new("user-1", "1234567", "S1", 9990))
            .unwrap();

        let status = StatusService::new(repo).get_status().unwrap();
        assert_eq!(status.total_accounts, 2);
        assert_eq!(status.total_submissions, 1);
        assert_eq!((status.pending.count, status.pending.points), (1, 3));
        assert_eq!((status.confirmed.count, status.confirmed.points), (1, 5));
        assert_eq!(status.cancelled.count, 0);
        assert_eq!(status.top_accounts.len(), 2);
        assert_eq!(status.db_size_bytes, 0);
    }
}
