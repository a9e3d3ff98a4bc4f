//! Points transaction domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason tag used by the verification pipeline for price reports
pub const REASON_PRICE_SUBMISSION: &str = "price_submission";

/// Reason tag for points granted by hand from the CLI
pub const REASON_MANUAL_ADJUSTMENT: &str = "manual_adjustment";

/// Lifecycle of a points transaction
///
/// Pending is the only non-terminal state. Every status change goes through
/// [`TransactionStatus::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Apply a transition, returning the new status if it is legal.
    ///
    /// Only Pending→Confirmed and Pending→Cancelled are legal. Anything else
    /// (including re-applying the current status) yields `None`.
    pub fn transition(self, target: TransactionStatus) -> Option<TransactionStatus> {
        match (self, target) {
            (TransactionStatus::Pending, TransactionStatus::Confirmed)
            | (TransactionStatus::Pending, TransactionStatus::Cancelled) => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "cancelled" | "canceled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// A single ledger entry awarding points to an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub account_id: String,
    /// Always positive
    pub amount: i64,
    /// Category tag, e.g. "price_submission"
    pub reason: String,
    /// Submission that earned this award (not owned by the transaction)
    pub reference_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    /// When the transaction left Pending
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PointsTransaction {
    /// Create a new Pending transaction
    pub fn new_pending(
        account_id: impl Into<String>,
        amount: i64,
        reason: impl Into<String>,
        reference_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            amount,
            reason: reason.into(),
            reference_id,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Move to `target`, stamping `resolved_at`. Returns false if illegal.
    pub fn resolve(&mut self, target: TransactionStatus) -> bool {
        match self.status.transition(target) {
            Some(next) => {
                self.status = next;
                self.resolved_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }
}

/// Read-side filters for listing transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<String>,
    pub reason: Option<String>,
    pub reference_id: Option<Uuid>,
    /// Case-insensitive match against account id, reason and transaction id
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl TransactionFilter {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_transitions() {
        use TransactionStatus::*;
        assert_eq!(Pending.transition(Confirmed), Some(Confirmed));
        assert_eq!(Pending.transition(Cancelled), Some(Cancelled));
        assert_eq!(Pending.transition(Pending), None);
        assert_eq!(Confirmed.transition(Cancelled), None);
        assert_eq!(Confirmed.transition(Confirmed), None);
        assert_eq!(Cancelled.transition(Confirmed), None);
    }

    #[test]
    fn test_resolve_is_one_shot() {
        let mut tx = PointsTransaction::new_pending("user-1", 5, REASON_PRICE_SUBMISSION, None);
        assert!(tx.resolve(TransactionStatus::Confirmed));
        assert!(tx.resolved_at.is_some());
        assert!(!tx.resolve(TransactionStatus::Cancelled));
        assert_eq!(tx.status, TransactionStatus::Confirmed);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Pending".parse::<TransactionStatus>(), Ok(TransactionStatus::Pending));
        assert_eq!("canceled".parse::<TransactionStatus>(), Ok(TransactionStatus::Cancelled));
        assert!("approved".parse::<TransactionStatus>().is_err());
    }
}
