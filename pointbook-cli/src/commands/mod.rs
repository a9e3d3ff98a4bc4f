//! CLI command implementations

pub mod audit;
pub mod import;
pub mod ledger;
pub mod logs;
pub mod review;
pub mod scan;
pub mod status;
pub mod store;
pub mod submit;

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use pointbook_core::services::{EntryPoint, LogEvent, LoggingService};
use pointbook_core::PointbookContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_pointbook_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Data directory from POINTBOOK_DIR, or ~/.pointbook
pub fn get_pointbook_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("POINTBOOK_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".pointbook"))
        .context("Could not find home directory; set POINTBOOK_DIR")
}

pub fn get_context() -> Result<PointbookContext> {
    let data_dir = get_pointbook_dir()?;
    PointbookContext::new(&data_dir)
        .with_context(|| format!("Failed to open pointbook data in {}", data_dir.display()))
}

/// Ids from arguments, or from stdin when nothing was passed and stdin is piped
///
/// Piped input is split on newlines if it has any, otherwise on commas.
pub fn ids_from_args_or_stdin(ids: Vec<String>) -> Result<Vec<String>> {
    if !ids.is_empty() || !atty::isnt(atty::Stream::Stdin) {
        return Ok(ids);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    let parts: Vec<&str> = if trimmed.contains('\n') {
        trimmed.lines().collect()
    } else {
        trimmed.split(',').collect()
    };
    Ok(parts
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
