//! Logs command - view and manage the event log

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use pointbook_core::services::{EntryPoint, LoggingService};
use serde_json::json;

use super::get_pointbook_dir;
use crate::output::{self, format_size};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old log entries
    Clear {
        /// Delete logs older than N days; 0 deletes everything
        #[arg(long, default_value = "30")]
        older_than_days: i64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-event counts and the database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// The logger main already opened, or a fresh one if that failed
fn with_service<T>(
    logger: &Option<LoggingService>,
    f: impl FnOnce(&LoggingService) -> Result<T>,
) -> Result<T> {
    match logger {
        Some(service) => f(service),
        None => {
            let service =
                LoggingService::new(&get_pointbook_dir()?, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))?;
            f(&service)
        }
    }
}

pub fn run(command: LogsCommands, logger: &Option<LoggingService>) -> Result<()> {
    with_service(logger, |service| match command {
        LogsCommands::List { limit, errors, json } => list(service, limit, errors, json),
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => clear(service, older_than_days, force, json),
        LogsCommands::Stats { json } => stats(service, json),
    })
}

fn list(service: &LoggingService, limit: usize, errors: bool, json: bool) -> Result<()> {
    let entries = if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Event", "Command", "Run", "Error"]);
    for entry in entries {
        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.event,
            entry.command.unwrap_or_default(),
            entry
                .run_id
                .map(|id| id.chars().take(8).collect::<String>())
                .unwrap_or_default(),
            entry.error_message.map(|e| e.red().to_string()).unwrap_or_default(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn clear(service: &LoggingService, older_than_days: i64, force: bool, json: bool) -> Result<()> {
    if !force && !json {
        let prompt = if older_than_days <= 0 {
            "Delete all log entries?".to_string()
        } else {
            format!("Delete logs older than {} days?", older_than_days)
        };
        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let deleted = if older_than_days <= 0 {
        service.clear()?
    } else {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        service.delete_before(cutoff.timestamp_millis())?
    };

    if json {
        println!("{}", json!({ "deleted": deleted }));
    } else {
        println!("Deleted {} log entries", deleted);
    }
    Ok(())
}

fn stats(service: &LoggingService, json: bool) -> Result<()> {
    let total = service.count()?;
    let events = service.stats()?;
    let db_path = service.db_path().to_path_buf();
    let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "total_entries": total,
                "events": events,
                "database_path": db_path.to_string_lossy(),
                "database_size_bytes": size_bytes
            }))?
        );
        return Ok(());
    }

    println!("{}", "Log Statistics".bold());
    println!("  Total entries: {}", total);
    println!("  Database: {}", db_path.display());
    println!("  Size: {}", format_size(size_bytes));
    if !events.is_empty() {
        let mut table = output::create_table();
        table.set_header(vec!["Event", "Count", "Errors"]);
        for event in &events {
            table.add_row(vec![
                event.event.clone(),
                event.count.to_string(),
                event.errors.to_string(),
            ]);
        }
        println!("{}", table);
    }
    Ok(())
}
