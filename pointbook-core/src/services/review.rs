//! Admin review - pending awards waiting for a human decision
//!
//! Confirm and cancel go straight to the ledger, so a transaction that the
//! queue or another admin resolved first just reports "not pending".

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{PointAccount, PointsTransaction, TransactionFilter, TransactionStatus};
use crate::services::PointsLedger;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Listing query for the review queue
#[derive(Debug, Clone)]
pub struct ReviewFilter {
    pub search: Option<String>,
    pub account_id: Option<String>,
    /// Zero-based page number
    pub page: usize,
    pub page_size: usize,
}

impl Default for ReviewFilter {
    fn default() -> Self {
        Self {
            search: None,
            account_id: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// What the reviewer needs to know about the submission behind an award
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionSummary {
    pub product_id: String,
    pub store_id: String,
    pub price: i64,
    pub image_url: Option<String>,
}

/// One pending transaction with its context
#[derive(Debug, Clone, Serialize)]
pub struct ReviewEntry {
    pub transaction: PointsTransaction,
    pub account_pending_points: i64,
    pub account_confirmed_points: i64,
    pub submission: Option<SubmissionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewPage {
    pub entries: Vec<ReviewEntry>,
    pub total: i64,
    pub page: usize,
    pub page_size: usize,
}

impl ReviewPage {
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        (self.total.max(0) as usize).div_ceil(self.page_size)
    }
}

/// Outcome of a batch confirm or cancel
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub succeeded: i64,
    pub failed: i64,
    pub results: Vec<BatchResultEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResultEntry {
    pub transaction_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ReviewService {
    repository: Arc<DuckDbRepository>,
    ledger: Arc<PointsLedger>,
}

impl ReviewService {
    pub fn new(repository: Arc<DuckDbRepository>, ledger: Arc<PointsLedger>) -> Self {
        Self { repository, ledger }
    }

    /// One page of pending transactions, oldest first
    pub fn list_pending(&self, filter: &ReviewFilter) -> Result<ReviewPage> {
        let page_size = if filter.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            filter.page_size
        };
        let tx_filter = TransactionFilter {
            account_id: filter.account_id.clone(),
            search: filter.search.clone(),
            limit: Some(page_size),
            offset: filter.page * page_size,
            ..TransactionFilter::default()
        };

        let total = self.ledger.count_by_status(TransactionStatus::Pending, &tx_filter)?;
        let transactions = self
            .ledger
            .list_by_status(TransactionStatus::Pending, &tx_filter)?;

        let mut accounts: HashMap<String, PointAccount> = HashMap::new();
        let mut entries = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            if !accounts.contains_key(&transaction.account_id) {
                let account = self.ledger.account(&transaction.account_id)?;
                accounts.insert(transaction.account_id.clone(), account);
            }
            let (pending, confirmed) = accounts
                .get(&transaction.account_id)
                .map(|a| (a.pending_points, a.confirmed_points))
                .unwrap_or((0, 0));

            let submission = match transaction.reference_id {
                Some(id) => self
                    .repository
                    .get_submission(id)
                    .map_err(|e| Error::database(format!("{:#}", e)))?
                    .map(|s| SubmissionSummary {
                        product_id: s.product_id,
                        store_id: s.store_id,
                        price: s.price,
                        image_url: s.image_url,
                    }),
                None => None,
            };

            entries.push(ReviewEntry {
                transaction,
                account_pending_points: pending,
                account_confirmed_points: confirmed,
                submission,
            });
        }

        Ok(ReviewPage {
            entries,
            total,
            page: filter.page,
            page_size,
        })
    }

    pub fn confirm(&self, transaction_id: Uuid) -> Result<bool> {
        self.ledger.confirm(transaction_id)
    }

    pub fn cancel(&self, transaction_id: Uuid) -> Result<bool> {
        self.ledger.cancel(transaction_id)
    }

    /// Confirm each id independently; one bad id never stops the rest
    pub fn confirm_many(&self, ids: &[String]) -> BatchResult {
        self.apply_many(ids, TransactionStatus::Confirmed)
    }

    /// Cancel each id independently; one bad id never stops the rest
    pub fn cancel_many(&self, ids: &[String]) -> BatchResult {
        self.apply_many(ids, TransactionStatus::Cancelled)
    }

    fn apply_many(&self, ids: &[String], target: TransactionStatus) -> BatchResult {
        let mut results = Vec::with_capacity(ids.len());
        let mut succeeded = 0i64;
        let mut failed = 0i64;

        for raw_id in ids {
            match self.apply_one(raw_id, target) {
                Ok(()) => {
                    succeeded += 1;
                    results.push(BatchResultEntry {
                        transaction_id: raw_id.clone(),
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    failed += 1;
                    results.push(BatchResultEntry {
                        transaction_id: raw_id.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::info!(status = %target, succeeded, failed, "batch review applied");
        BatchResult {
            succeeded,
            failed,
            results,
        }
    }

    fn apply_one(&self, raw_id: &str, target: TransactionStatus) -> Result<()> {
        let id = Uuid::parse_str(raw_id.trim())
            .map_err(|_| Error::validation(format!("invalid transaction id '{}'", raw_id)))?;
        let applied = match target {
            TransactionStatus::Confirmed => self.ledger.confirm(id)?,
            _ => self.ledger.cancel(id)?,
        };
        if applied {
            Ok(())
        } else {
            Err(Error::validation("transaction is not pending"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Submission, REASON_PRICE_SUBMISSION};

    fn setup() -> (Arc<DuckDbRepository>, ReviewService) {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let ledger = Arc::new(PointsLedger::new(Arc::clone(&repo)));
        (Arc::clone(&repo), ReviewService::new(repo, ledger))
    }

    #[test]
    fn test_list_pending_is_denormalized() {
        let (repo, review) = setup();
        let submission = Submission::new("user-1", "1234567", "S1", 9990);
        repo.insert_submission(&submission).unwrap();
        review
            .ledger
            .add("user-1", 5, REASON_PRICE_SUBMISSION, Some(submission.id))
            .unwrap();

        let page = review.list_pending(&ReviewFilter::default()).unwrap();
        assert_eq!(page.total, 1);
        let entry = &page.entries[0];
        assert_eq!(entry.account_pending_points, 5);
        let summary = entry.submission.as_ref().unwrap();
        assert_eq!(summary.product_id, "1234567");
        assert_eq!(summary.price, 9990);
    }

    #[test]
    fn test_pagination() {
        let (_repo, review) = setup();
        for i in 0..5 {
            review
                .ledger
                .add(&format!("user-{}", i), 5, REASON_PRICE_SUBMISSION, None)
                .unwrap();
        }
        let filter = ReviewFilter {
            page: 1,
            page_size: 2,
            ..ReviewFilter::default()
        };
        let page = review.list_pending(&filter).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn test_batch_tolerates_bad_ids() {
        let (_repo, review) = setup();
        let a = review.ledger.add("user-1", 5, REASON_PRICE_SUBMISSION, None).unwrap();
        let b = review.ledger.add("user-1", 5, REASON_PRICE_SUBMISSION, None).unwrap();
        review.cancel(b).unwrap();

        let result = review.confirm_many(&[
            a.to_string(),
            "not-a-uuid".to_string(),
            b.to_string(),
            Uuid::new_v4().to_string(),
        ]);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 3);
        assert!(result.results[0].success);
        assert!(result.results[1].error.as_deref().unwrap().contains("invalid transaction id"));
        assert!(result.results[2].error.as_deref().unwrap().contains("not pending"));
        assert!(result.results[3].error.as_deref().unwrap().contains("Not found"));

        let account = review.ledger.account("user-1").unwrap();
        assert_eq!((account.pending_points, account.confirmed_points), (0, 5));
        assert_eq!(review.list_pending(&ReviewFilter::default()).unwrap().total, 0);
    }
}
