//! Point account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user points balance
///
/// Balances are derived state: `pending_points` always equals the sum of the
/// account's Pending transactions and `confirmed_points` the sum of its
/// Confirmed ones. Only the ledger writes these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointAccount {
    /// Opaque user identifier supplied by the session layer
    pub account_id: String,
    /// Awarded but not yet trusted (excluded from spendable balance)
    pub pending_points: i64,
    /// Spendable balance
    pub confirmed_points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PointAccount {
    /// An account with no transactions yet
    pub fn empty(account_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            account_id: account_id.into(),
            pending_points: 0,
            confirmed_points: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending plus confirmed
    pub fn total_points(&self) -> i64 {
        self.pending_points + self.confirmed_points
    }

    /// Validate a user-supplied account identifier
    pub fn validate_id(account_id: &str) -> Result<(), &'static str> {
        if account_id.trim().is_empty() {
            return Err("account id cannot be empty");
        }
        if account_id.len() > 128 {
            return Err("account id is longer than 128 characters");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_account() {
        let account = PointAccount::empty("user-1");
        assert_eq!(account.pending_points, 0);
        assert_eq!(account.confirmed_points, 0);
        assert_eq!(account.total_points(), 0);
    }

    #[test]
    fn test_account_id_validation() {
        assert!(PointAccount::validate_id("user-1").is_ok());
        assert!(PointAccount::validate_id("   ").is_err());
        assert!(PointAccount::validate_id(&"x".repeat(129)).is_err());
    }
}
