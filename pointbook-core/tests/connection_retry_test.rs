//! Tests for opening the database file repeatedly
//!
//! Run with: cargo test --test connection_retry_test -- --nocapture

use std::time::Instant;

use tempfile::TempDir;

use pointbook_core::adapters::duckdb::DuckDbRepository;
use pointbook_core::domain::{Store, REASON_MANUAL_ADJUSTMENT};
use pointbook_core::services::PointsLedger;

/// Each CLI invocation opens and drops its own connection
#[test]
fn test_sequential_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_sequential.duckdb");

    for i in 0..5 {
        let start = Instant::now();
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        repo.upsert_store(&Store::new(format!("S{}", i), "Corner shop")).unwrap();
        println!("Connection {}: opened in {:?}", i, start.elapsed());
    }

    let repo = DuckDbRepository::new(&db_path).unwrap();
    assert_eq!(repo.list_stores().unwrap().len(), 5);
}

/// Migrations run once; later opens find nothing to apply
#[test]
fn test_reopen_applies_no_migrations() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.duckdb");

    {
        let repo = DuckDbRepository::new(&db_path).unwrap();
        let first = repo.run_migrations().unwrap();
        assert!(!first.applied.is_empty());
    }

    let repo = DuckDbRepository::new(&db_path).unwrap();
    let second = repo.run_migrations().unwrap();
    assert!(second.applied.is_empty());
    assert!(repo.table_exists("sys_point_transactions").unwrap());
    assert!(repo.get_db_size().unwrap() > 0);
}

#[test]
fn test_in_memory_databases_are_isolated() {
    let first = std::sync::Arc::new(DuckDbRepository::open_in_memory().unwrap());
    first.ensure_schema().unwrap();
    PointsLedger::new(first.clone())
        .add("user-1", 5, REASON_MANUAL_ADJUSTMENT, None)
        .unwrap();

    let second = DuckDbRepository::open_in_memory().unwrap();
    second.ensure_schema().unwrap();

    assert_eq!(first.count_accounts().unwrap(), 1);
    assert_eq!(second.count_accounts().unwrap(), 0);
    assert!(second.db_path().is_none());
    assert_eq!(second.get_db_size().unwrap(), 0);
}
