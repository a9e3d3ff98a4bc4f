//! Event log migrations - embedded SQL for logs.duckdb
//!
//! Applied by the same runner as the ledger migrations, but tracked in the
//! log database's own sys_migrations table.

/// Log migrations in apply order; append `NNN_description.sql` entries here
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
