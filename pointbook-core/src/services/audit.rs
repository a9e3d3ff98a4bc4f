//! Audit service - ledger consistency checks

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;

pub const DEFAULT_STALE_AFTER_DAYS: i64 = 7;

const REQUIRED_TABLES: [&str; 4] = [
    "sys_point_accounts",
    "sys_point_transactions",
    "sys_submissions",
    "sys_stores",
];

/// Audit service for ledger health checks
pub struct AuditService {
    repository: Arc<DuckDbRepository>,
}

impl AuditService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Run all checks; pending awards older than `stale_after_days` are flagged
    pub fn run_checks(&self, stale_after_days: i64) -> Result<AuditResult> {
        let mut checks = BTreeMap::new();

        let missing: Vec<&str> = REQUIRED_TABLES
            .iter()
            .copied()
            .filter(|t| !matches!(self.repository.table_exists(t), Ok(true)))
            .collect();
        if !missing.is_empty() {
            // Nothing else can be checked without the tables
            checks.insert(
                "schema".to_string(),
                CheckResult::error(
                    format!("{} table(s) missing", missing.len()),
                    missing.iter().map(|t| json!({ "table": t })).collect(),
                ),
            );
            return Ok(AuditResult::from_checks(checks));
        }
        checks.insert(
            "schema".to_string(),
            CheckResult::pass("All ledger tables present"),
        );

        let drift = self.repository.check_balance_drift()?;
        checks.insert(
            "balance_drift".to_string(),
            if drift.is_empty() {
                CheckResult::pass("Account balances match their transactions")
            } else {
                CheckResult::error(
                    format!("{} account(s) disagree with their transactions", drift.len()),
                    drift
                        .iter()
                        .map(|d| serde_json::to_value(d).unwrap_or_else(|_| json!({ "account_id": d.account_id })))
                        .collect(),
                )
            },
        );

        let orphaned = self.repository.check_orphaned_transactions()?;
        checks.insert(
            "orphaned_transactions".to_string(),
            if orphaned.is_empty() {
                CheckResult::pass("Every transaction has an account")
            } else {
                CheckResult::error(
                    format!("{} account id(s) have transactions but no balance row", orphaned.len()),
                    orphaned.iter().map(|a| json!({ "account_id": a })).collect(),
                )
            },
        );

        let dangling = self.repository.check_dangling_references()?;
        checks.insert(
            "dangling_references".to_string(),
            if dangling.is_empty() {
                CheckResult::pass("All transaction references resolve")
            } else {
                CheckResult::warning(
                    format!("{} transaction(s) reference a missing submission", dangling.len()),
                    dangling.iter().map(|t| json!({ "transaction_id": t })).collect(),
                )
            },
        );

        let cutoff = Utc::now() - Duration::days(stale_after_days.max(0));
        let stale = self.repository.count_pending_before(cutoff)?;
        checks.insert(
            "stale_pending".to_string(),
            if stale == 0 {
                CheckResult::pass(format!(
                    "No pending awards older than {} day(s)",
                    stale_after_days
                ))
            } else {
                CheckResult::warning(
                    format!(
                        "{} pending award(s) waiting more than {} day(s)",
                        stale, stale_after_days
                    ),
                    vec![json!({ "count": stale, "older_than_days": stale_after_days })],
                )
            },
        );

        let result = AuditResult::from_checks(checks);
        tracing::info!(
            passed = result.summary.passed,
            warnings = result.summary.warnings,
            errors = result.summary.errors,
            "ledger audit finished"
        );
        Ok(result)
    }
}

#[derive(Debug, Serialize)]
pub struct AuditResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: AuditSummary,
}

impl AuditResult {
    fn from_checks(checks: BTreeMap<String, CheckResult>) -> Self {
        let count = |status: &str| checks.values().filter(|c| c.status == status).count() as i64;
        let summary = AuditSummary {
            passed: count("pass"),
            warnings: count("warning"),
            errors: count("error"),
        };
        Self { checks, summary }
    }

    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: "pass".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warning(message: String, details: Vec<serde_json::Value>) -> Self {
        Self {
            status: "warning".to_string(),
            message,
            details: Some(details),
        }
    }

    fn error(message: String, details: Vec<serde_json::Value>) -> Self {
        Self {
            status: "error".to_string(),
            message,
            details: Some(details),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
