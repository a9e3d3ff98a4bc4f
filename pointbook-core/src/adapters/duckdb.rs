//! DuckDB repository implementation
//!
//! One connection behind a mutex. Every ledger mutation runs as a single
//! DuckDB transaction while the lock is held, and status changes are
//! conditional on the row still being pending.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::types::Value;
use duckdb::{params, params_from_iter, Connection, OptionalExt};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    GeoPoint, PointAccount, PointsTransaction, Store, Submission, TransactionFilter,
    TransactionStatus,
};
use crate::services::MigrationService;

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Fixed-width UTC format; lexical order equals chronological order
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .with_context(|| format!("Invalid timestamp '{}'", s))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid id '{}'", s))
}

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
        || lower.contains("file is already open")
}

/// Result of a conditional status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The row was pending and now has the target status
    Applied,
    /// The row had already left pending; nothing changed
    AlreadyResolved(TransactionStatus),
    Missing,
}

/// Stored balance disagreeing with the sum of its transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub account_id: String,
    pub pending_points: i64,
    pub confirmed_points: i64,
    pub expected_pending: i64,
    pub expected_confirmed: i64,
}

/// Count and amount of transactions in one status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub status: TransactionStatus,
    pub count: i64,
    pub points: i64,
}

const TRANSACTION_COLUMNS: &str = "t.transaction_id, t.account_id, t.amount, t.reason, \
     t.reference_id, t.status, t.created_at, t.resolved_at";

const SUBMISSION_COLUMNS: &str = "submission_id, account_id, product_id, store_id, price, \
     image_url, latitude, longitude, discount_period, created_at";

/// Raw transaction row; converted outside the row closure so parse errors propagate
struct TransactionRow {
    id: String,
    account_id: String,
    amount: i64,
    reason: String,
    reference_id: Option<String>,
    status: String,
    created_at: String,
    resolved_at: Option<String>,
}

impl TransactionRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            amount: row.get(2)?,
            reason: row.get(3)?,
            reference_id: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
            resolved_at: row.get(7)?,
        })
    }

    fn into_domain(self) -> Result<PointsTransaction> {
        Ok(PointsTransaction {
            id: parse_uuid(&self.id)?,
            account_id: self.account_id,
            amount: self.amount,
            reason: self.reason,
            reference_id: self.reference_id.as_deref().map(parse_uuid).transpose()?,
            status: self.status.parse().map_err(|e: String| anyhow!(e))?,
            created_at: parse_timestamp(&self.created_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

struct SubmissionRow {
    id: String,
    account_id: String,
    product_id: String,
    store_id: String,
    price: i64,
    image_url: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    discount_period: Option<String>,
    created_at: String,
}

impl SubmissionRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            product_id: row.get(2)?,
            store_id: row.get(3)?,
            price: row.get(4)?,
            image_url: row.get(5)?,
            latitude: row.get(6)?,
            longitude: row.get(7)?,
            discount_period: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_domain(self) -> Result<Submission> {
        let device_location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        Ok(Submission {
            id: parse_uuid(&self.id)?,
            account_id: self.account_id,
            product_id: self.product_id,
            store_id: self.store_id,
            price: self.price,
            photo: None,
            image_url: self.image_url,
            device_location,
            discount_period: self.discount_period,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file
    ///
    /// Retries with exponential backoff on file locking errors, which occur
    /// when another process (a second CLI run) holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Autoloading would pull cached extensions from ~/.duckdb; everything
        // needed is statically linked
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("Database lock poisoned: {}", e))
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<crate::services::MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::info!(applied = ?result.applied, "database migrated");
        }
        Ok(())
    }

    // === Ledger operations ===

    /// Insert a pending transaction and credit the account's pending balance
    ///
    /// Creates the account row on first use. Both writes commit together.
    pub fn add_pending_transaction(&self, tx: &PointsTransaction) -> Result<()> {
        if tx.status != TransactionStatus::Pending {
            return Err(anyhow!("New transactions must be pending, got {}", tx.status));
        }

        let mut conn = self.lock()?;
        let db_tx = conn.transaction()?;
        let now = format_timestamp(&Utc::now());

        db_tx.execute(
            "INSERT INTO sys_point_accounts
                 (account_id, pending_points, confirmed_points, created_at, updated_at)
             VALUES (?, 0, 0, ?, ?)
             ON CONFLICT (account_id) DO NOTHING",
            params![tx.account_id, now, now],
        )?;

        db_tx.execute(
            "INSERT INTO sys_point_transactions
                 (transaction_id, account_id, amount, reason, reference_id, status, created_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, 'pending', ?, NULL)",
            params![
                tx.id.to_string(),
                tx.account_id,
                tx.amount,
                tx.reason,
                tx.reference_id.map(|r| r.to_string()),
                format_timestamp(&tx.created_at),
            ],
        )?;

        db_tx.execute(
            "UPDATE sys_point_accounts
             SET pending_points = pending_points + ?, updated_at = ?
             WHERE account_id = ?",
            params![tx.amount, now, tx.account_id],
        )?;

        db_tx.commit()?;
        Ok(())
    }

    /// Move a pending transaction to a terminal status and rebalance its account
    ///
    /// The status update only matches rows still pending, so of two racing
    /// callers exactly one sees `Applied`.
    pub fn resolve_transaction(&self, id: Uuid, target: TransactionStatus) -> Result<Transition> {
        if target == TransactionStatus::Pending {
            return Err(anyhow!("Cannot resolve a transaction to pending"));
        }

        let mut conn = self.lock()?;
        let db_tx = conn.transaction()?;
        let id_str = id.to_string();

        let current: Option<(String, i64, String)> = db_tx
            .query_row(
                "SELECT account_id, amount, status FROM sys_point_transactions
                 WHERE transaction_id = ?",
                [&id_str],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((account_id, amount, status)) = current else {
            return Ok(Transition::Missing);
        };
        let status: TransactionStatus = status.parse().map_err(|e: String| anyhow!(e))?;
        if status.transition(target).is_none() {
            return Ok(Transition::AlreadyResolved(status));
        }

        let now = format_timestamp(&Utc::now());
        let changed = db_tx.execute(
            "UPDATE sys_point_transactions
             SET status = ?, resolved_at = ?
             WHERE transaction_id = ? AND status = 'pending'",
            params![target.as_str(), now, id_str],
        )?;
        if changed == 0 {
            return Ok(Transition::AlreadyResolved(status));
        }

        let balance_sql = match target {
            TransactionStatus::Confirmed => {
                "UPDATE sys_point_accounts
                 SET pending_points = pending_points - $1,
                     confirmed_points = confirmed_points + $1,
                     updated_at = $2
                 WHERE account_id = $3"
            }
            _ => {
                "UPDATE sys_point_accounts
                 SET pending_points = pending_points - $1, updated_at = $2
                 WHERE account_id = $3"
            }
        };
        let updated = db_tx.execute(balance_sql, params![amount, now, account_id])?;
        if updated != 1 {
            // Dropping the transaction rolls the status change back
            return Err(anyhow!("Account '{}' missing for transaction {}", account_id, id));
        }

        db_tx.commit()?;
        Ok(Transition::Applied)
    }

    pub fn get_transaction(&self, id: Uuid) -> Result<Option<PointsTransaction>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_point_transactions t WHERE t.transaction_id = ?",
            TRANSACTION_COLUMNS
        );
        let row = conn
            .query_row(&sql, [id.to_string()], TransactionRow::read)
            .optional()?;
        row.map(TransactionRow::into_domain).transpose()
    }

    /// Transactions in one status, oldest first
    pub fn list_transactions(
        &self,
        status: TransactionStatus,
        filter: &TransactionFilter,
    ) -> Result<Vec<PointsTransaction>> {
        let (where_clause, values) = transaction_where(status, filter);
        let mut sql = format!(
            "SELECT {} FROM sys_point_transactions t WHERE {} \
             ORDER BY t.created_at ASC, t.transaction_id ASC",
            TRANSACTION_COLUMNS, where_clause
        );
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if filter.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", filter.offset));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), TransactionRow::read)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    /// Count matching transactions, ignoring limit and offset
    pub fn count_transactions(
        &self,
        status: TransactionStatus,
        filter: &TransactionFilter,
    ) -> Result<i64> {
        let (where_clause, values) = transaction_where(status, filter);
        let sql = format!(
            "SELECT COUNT(*) FROM sys_point_transactions t WHERE {}",
            where_clause
        );
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count)
    }

    // === Accounts ===

    pub fn get_account(&self, account_id: &str) -> Result<Option<PointAccount>> {
        let conn = self.lock()?;
        let row: Option<(String, i64, i64, String, String)> = conn
            .query_row(
                "SELECT account_id, pending_points, confirmed_points, created_at, updated_at
                 FROM sys_point_accounts WHERE account_id = ?",
                [account_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        row.map(account_from_row).transpose()
    }

    /// All accounts, highest total first
    pub fn list_accounts(&self, limit: Option<usize>) -> Result<Vec<PointAccount>> {
        let mut sql = String::from(
            "SELECT account_id, pending_points, confirmed_points, created_at, updated_at
             FROM sys_point_accounts
             ORDER BY pending_points + confirmed_points DESC, account_id ASC",
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(account_from_row).collect()
    }

    pub fn count_accounts(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_point_accounts", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Submissions ===

    pub fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let conn = self.lock()?;
        let (lat, lon) = match submission.device_location {
            Some(p) => (Some(p.latitude), Some(p.longitude)),
            None => (None, None),
        };
        conn.execute(
            "INSERT INTO sys_submissions
                 (submission_id, account_id, product_id, store_id, price, image_url,
                  latitude, longitude, discount_period, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                submission.id.to_string(),
                submission.account_id,
                submission.product_id,
                submission.store_id,
                submission.price,
                submission.image_url,
                lat,
                lon,
                submission.discount_period,
                format_timestamp(&submission.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_submission(&self, id: Uuid) -> Result<Option<Submission>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_submissions WHERE submission_id = ?",
            SUBMISSION_COLUMNS
        );
        let row = conn
            .query_row(&sql, [id.to_string()], SubmissionRow::read)
            .optional()?;
        row.map(SubmissionRow::into_domain).transpose()
    }

    /// Most recent submission for a product at a store, created at or after `since`
    ///
    /// Ids compare case-insensitively.
    pub fn latest_submission_since(
        &self,
        product_id: &str,
        store_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Submission>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_submissions
             WHERE lower(product_id) = lower(?) AND lower(store_id) = lower(?)
               AND created_at >= ?
             ORDER BY created_at DESC
             LIMIT 1",
            SUBMISSION_COLUMNS
        );
        let row = conn
            .query_row(
                &sql,
                params![product_id.trim(), store_id.trim(), format_timestamp(&since)],
                SubmissionRow::read,
            )
            .optional()?;
        row.map(SubmissionRow::into_domain).transpose()
    }

    pub fn count_submissions(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_submissions", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Stores ===

    pub fn upsert_store(&self, store: &Store) -> Result<()> {
        let conn = self.lock()?;
        let (lat, lon) = match store.location {
            Some(p) => (Some(p.latitude), Some(p.longitude)),
            None => (None, None),
        };
        conn.execute(
            "INSERT INTO sys_stores (store_id, name, latitude, longitude, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (store_id) DO UPDATE SET
                 name = EXCLUDED.name,
                 latitude = EXCLUDED.latitude,
                 longitude = EXCLUDED.longitude",
            params![
                store.store_id,
                store.name,
                lat,
                lon,
                format_timestamp(&store.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_store(&self, store_id: &str) -> Result<Option<Store>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT store_id, name, latitude, longitude, created_at
                 FROM sys_stores WHERE lower(store_id) = lower(?)",
                [store_id.trim()],
                store_row,
            )
            .optional()?;
        row.map(store_from_row).transpose()
    }

    pub fn list_stores(&self) -> Result<Vec<Store>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT store_id, name, latitude, longitude, created_at
             FROM sys_stores ORDER BY store_id",
        )?;
        let rows = stmt
            .query_map([], store_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(store_from_row).collect()
    }

    // === Audit checks ===

    /// Accounts whose stored balances differ from their transaction sums
    pub fn check_balance_drift(&self) -> Result<Vec<BalanceDrift>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "WITH sums AS (
                 SELECT account_id,
                        CAST(COALESCE(SUM(amount) FILTER (WHERE status = 'pending'), 0) AS BIGINT) AS pending,
                        CAST(COALESCE(SUM(amount) FILTER (WHERE status = 'confirmed'), 0) AS BIGINT) AS confirmed
                 FROM sys_point_transactions
                 GROUP BY account_id
             )
             SELECT a.account_id, a.pending_points, a.confirmed_points,
                    COALESCE(s.pending, 0), COALESCE(s.confirmed, 0)
             FROM sys_point_accounts a
             LEFT JOIN sums s ON s.account_id = a.account_id
             WHERE a.pending_points <> COALESCE(s.pending, 0)
                OR a.confirmed_points <> COALESCE(s.confirmed, 0)
             ORDER BY a.account_id",
        )?;
        let drift = stmt
            .query_map([], |row| {
                Ok(BalanceDrift {
                    account_id: row.get(0)?,
                    pending_points: row.get(1)?,
                    confirmed_points: row.get(2)?,
                    expected_pending: row.get(3)?,
                    expected_confirmed: row.get(4)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(drift)
    }

    /// Account ids that have transactions but no balance row
    pub fn check_orphaned_transactions(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT t.account_id FROM sys_point_transactions t
             LEFT JOIN sys_point_accounts a ON t.account_id = a.account_id
             WHERE a.account_id IS NULL
             ORDER BY t.account_id",
        )?;
        let orphans = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(orphans)
    }

    /// Transaction ids whose reference points at no stored submission
    pub fn check_dangling_references(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.transaction_id FROM sys_point_transactions t
             LEFT JOIN sys_submissions s ON t.reference_id = s.submission_id
             WHERE t.reference_id IS NOT NULL AND s.submission_id IS NULL
             ORDER BY t.created_at",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Pending transactions created before `cutoff`
    pub fn count_pending_before(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_point_transactions
             WHERE status = 'pending' AND created_at < ?",
            [format_timestamp(&cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count and points per transaction status
    pub fn transaction_totals(&self) -> Result<Vec<StatusTotals>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*), CAST(COALESCE(SUM(amount), 0) AS BIGINT)
             FROM sys_point_transactions
             GROUP BY status
             ORDER BY status",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<duckdb::Result<Vec<(String, i64, i64)>>>()?;

        rows.into_iter()
            .map(|(status, count, points)| {
                Ok(StatusTotals {
                    status: status.parse().map_err(|e: String| anyhow!(e))?,
                    count,
                    points,
                })
            })
            .collect()
    }

    /// Check if a table exists in the main schema
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = 'main' AND table_name = ?",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_db_size(&self) -> Result<u64> {
        match &self.db_path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }
}

/// WHERE clause and bound values for a transaction listing
fn transaction_where(status: TransactionStatus, filter: &TransactionFilter) -> (String, Vec<Value>) {
    let mut conditions = vec!["t.status = ?".to_string()];
    let mut values = vec![Value::Text(status.as_str().to_string())];

    if let Some(account_id) = &filter.account_id {
        conditions.push("t.account_id = ?".to_string());
        values.push(Value::Text(account_id.clone()));
    }
    if let Some(reason) = &filter.reason {
        conditions.push("t.reason = ?".to_string());
        values.push(Value::Text(reason.clone()));
    }
    if let Some(reference_id) = &filter.reference_id {
        conditions.push("t.reference_id = ?".to_string());
        values.push(Value::Text(reference_id.to_string()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push(
            "(t.account_id ILIKE ? OR t.reason ILIKE ? OR t.transaction_id ILIKE ? \
             OR COALESCE(t.reference_id, '') ILIKE ?)"
                .to_string(),
        );
        let pattern = format!("%{}%", search);
        for _ in 0..4 {
            values.push(Value::Text(pattern.clone()));
        }
    }

    (conditions.join(" AND "), values)
}

fn account_from_row(row: (String, i64, i64, String, String)) -> Result<PointAccount> {
    let (account_id, pending_points, confirmed_points, created_at, updated_at) = row;
    Ok(PointAccount {
        account_id,
        pending_points,
        confirmed_points,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

type StoreRow = (String, String, Option<f64>, Option<f64>, String);

fn store_row(row: &duckdb::Row) -> duckdb::Result<StoreRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn store_from_row(row: StoreRow) -> Result<Store> {
    let (store_id, name, lat, lon, created_at) = row;
    let location = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
        _ => None,
    };
    Ok(Store {
        store_id,
        name,
        location,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use crate::domain::REASON_PRICE_SUBMISSION;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn account_balances(repo: &DuckDbRepository, id: &str) -> (i64, i64) {
        let account = repo.get_account(id).unwrap().unwrap();
        (account.pending_points, account.confirmed_points)
    }

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let a = Utc::now();
        let b = a + ChronoDuration::milliseconds(1500);
        let (sa, sb) = (format_timestamp(&a), format_timestamp(&b));
        assert!(sa < sb);
        assert_eq!(sa.len(), sb.len());
        let parsed = parse_timestamp(&sa).unwrap();
        assert_eq!(parsed.timestamp_micros(), a.timestamp_micros());
    }

    #[test]
    fn test_add_creates_account_and_credits_pending() {
        let repo = repo();
        let tx = PointsTransaction::new_pending("user-1", 5, REASON_PRICE_SUBMISSION, None);
        repo.add_pending_transaction(&tx).unwrap();

        assert_eq!(account_balances(&repo, "user-1"), (5, 0));
        let stored = repo.get_transaction(tx.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.amount, 5);
        assert!(stored.resolved_at.is_none());
    }

    #[test]
    fn test_resolve_is_conditional() {
        let repo = repo();
        let tx = PointsTransaction::new_pending("user-1", 7, REASON_PRICE_SUBMISSION, None);
        repo.add_pending_transaction(&tx).unwrap();

        assert_eq!(
            repo.resolve_transaction(tx.id, TransactionStatus::Confirmed).unwrap(),
            Transition::Applied
        );
        assert_eq!(account_balances(&repo, "user-1"), (0, 7));

        assert_eq!(
            repo.resolve_transaction(tx.id, TransactionStatus::Cancelled).unwrap(),
            Transition::AlreadyResolved(TransactionStatus::Confirmed)
        );
        assert_eq!(account_balances(&repo, "user-1"), (0, 7));

        assert_eq!(
            repo.resolve_transaction(Uuid::new_v4(), TransactionStatus::Confirmed).unwrap(),
            Transition::Missing
        );
    }

    #[test]
    fn test_list_filters_and_pages() {
        let repo = repo();
        for (account, amount) in [("alice", 5), ("bob", 5), ("alice", 3)] {
            let tx = PointsTransaction::new_pending(account, amount, REASON_PRICE_SUBMISSION, None);
            repo.add_pending_transaction(&tx).unwrap();
        }

        let all = repo
            .list_transactions(TransactionStatus::Pending, &TransactionFilter::default())
            .unwrap();
        assert_eq!(all.len(), 3);

        let alice = TransactionFilter::for_account("alice");
        assert_eq!(repo.count_transactions(TransactionStatus::Pending, &alice).unwrap(), 2);

        let search = TransactionFilter {
            search: Some("BO".to_string()),
            ..TransactionFilter::default()
        };
        let found = repo.list_transactions(TransactionStatus::Pending, &search).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].account_id, "bob");

        let page = TransactionFilter {
            limit: Some(2),
            offset: 2,
            ..TransactionFilter::default()
        };
        assert_eq!(
            repo.list_transactions(TransactionStatus::Pending, &page).unwrap().len(),
            1
        );
        assert!(repo
            .list_transactions(TransactionStatus::Confirmed, &TransactionFilter::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_latest_submission_within_window() {
        let repo = repo();
        let mut old = Submission::new("user-1", "1234567", "S1", 8990);
        old.created_at = Utc::now() - ChronoDuration::hours(30);
        repo.insert_submission(&old).unwrap();

        let since = Utc::now() - ChronoDuration::hours(24);
        assert!(repo.latest_submission_since("1234567", "S1", since).unwrap().is_none());

        let recent = Submission::new("user-2", "1234567", "S1", 9990)
            .with_location(GeoPoint::new(37.5, 127.0));
        repo.insert_submission(&recent).unwrap();

        let latest = repo
            .latest_submission_since("1234567", "s1", since)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, recent.id);
        assert_eq!(latest.price, 9990);
        assert_eq!(latest.device_location, Some(GeoPoint::new(37.5, 127.0)));
    }

    #[test]
    fn test_store_upsert_updates_location() {
        let repo = repo();
        let mut store = Store::new("S1", "Corner Mart");
        repo.upsert_store(&store).unwrap();
        assert!(repo.get_store("S1").unwrap().unwrap().location.is_none());

        store.location = Some(GeoPoint::new(37.0, 127.0));
        repo.upsert_store(&store).unwrap();
        let stored = repo.get_store("s1").unwrap().unwrap();
        assert_eq!(stored.location, Some(GeoPoint::new(37.0, 127.0)));
        assert_eq!(repo.list_stores().unwrap().len(), 1);
    }

    #[test]
    fn test_drift_detects_tampered_balance() {
        let repo = repo();
        let tx = PointsTransaction::new_pending("user-1", 5, REASON_PRICE_SUBMISSION, None);
        repo.add_pending_transaction(&tx).unwrap();
        assert!(repo.check_balance_drift().unwrap().is_empty());

        repo.lock()
            .unwrap()
            .execute(
                "UPDATE sys_point_accounts SET confirmed_points = 40 WHERE account_id = 'user-1'",
                [],
            )
            .unwrap();

        let drift = repo.check_balance_drift().unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].confirmed_points, 40);
        assert_eq!(drift[0].expected_confirmed, 0);
        assert_eq!(drift[0].expected_pending, 5);
    }

    #[test]
    fn test_dangling_references_and_totals() {
        let repo = repo();
        let submission = Submission::new("user-1", "1234567", "S1", 9990);
        repo.insert_submission(&submission).unwrap();

        let linked =
            PointsTransaction::new_pending("user-1", 5, REASON_PRICE_SUBMISSION, Some(submission.id));
        let dangling =
            PointsTransaction::new_pending("user-1", 5, REASON_PRICE_SUBMISSION, Some(Uuid::new_v4()));
        repo.add_pending_transaction(&linked).unwrap();
        repo.add_pending_transaction(&dangling).unwrap();
        repo.resolve_transaction(linked.id, TransactionStatus::Confirmed).unwrap();

        assert_eq!(
            repo.check_dangling_references().unwrap(),
            vec![dangling.id.to_string()]
        );

        let totals = repo.transaction_totals().unwrap();
        let confirmed = totals
            .iter()
            .find(|t| t.status == TransactionStatus::Confirmed)
            .unwrap();
        assert_eq!((confirmed.count, confirmed.points), (1, 5));
        assert_eq!(repo.count_pending_before(Utc::now() + ChronoDuration::seconds(1)).unwrap(), 1);
    }
}
