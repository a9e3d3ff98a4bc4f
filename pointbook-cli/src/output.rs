//! Output formatting utilities

use std::time::Duration;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use pointbook_core::domain::{ItemStatus, QueueSummary, SubmissionItem, TransactionStatus};
use pointbook_core::services::{PauseHandle, QueueObserver};

pub fn success(msg: &str) {
    println!("{}", msg.green());
}

pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

pub fn transaction_status_cell(status: TransactionStatus) -> Cell {
    match status {
        TransactionStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        TransactionStatus::Confirmed => Cell::new("confirmed").fg(Color::Green),
        TransactionStatus::Cancelled => Cell::new("cancelled").fg(Color::Red),
    }
}

pub fn item_status_cell(status: ItemStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        ItemStatus::Succeeded => cell.fg(Color::Green),
        ItemStatus::Failed => cell.fg(Color::Red),
        ItemStatus::Skipped => cell.fg(Color::DarkGrey),
        ItemStatus::Queued | ItemStatus::Processing => cell,
    }
}

/// One-line summary of a queue run
pub fn print_queue_summary(summary: &QueueSummary) {
    println!(
        "{} succeeded, {} failed, {} skipped, {} queued; {} points awarded",
        summary.succeeded.to_string().green(),
        summary.failed.to_string().red(),
        summary.skipped.to_string().dimmed(),
        summary.queued,
        summary.points_awarded.to_string().bold(),
    );
}

/// Progress bar for a queue run that can pause itself after N items
pub struct ProgressObserver {
    bar: ProgressBar,
    pause: PauseHandle,
    pause_after: Option<usize>,
}

impl ProgressObserver {
    pub fn new(total: usize, done: usize, pause: PauseHandle, pause_after: Option<usize>) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{bar:32}] {pos}/{len} {wide_msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_position(done as u64);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            pause,
            pause_after,
        }
    }

    /// A bar that draws nothing, for JSON output
    pub fn hidden(pause: PauseHandle, pause_after: Option<usize>) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            pause,
            pause_after,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl QueueObserver for ProgressObserver {
    fn on_item(&mut self, index: usize, item: &SubmissionItem) {
        self.bar.set_position(index as u64 + 1);
        let label = format!("{} @ {}", item.payload.product_id, item.payload.store_id);
        match item.status {
            ItemStatus::Failed => self.bar.println(format!(
                "{} {}: {}",
                "failed".red(),
                label,
                item.error.as_deref().unwrap_or("unknown error")
            )),
            _ => self.bar.set_message(label),
        }

        if let Some(limit) = self.pause_after {
            if index + 1 >= limit {
                self.pause.pause();
            }
        }
    }

    fn on_complete(&mut self, _summary: &QueueSummary) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointbook_core::domain::SubmissionPayload;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_observer_pauses_after_limit() {
        let pause = PauseHandle::new();
        let mut observer = ProgressObserver::hidden(pause.clone(), Some(2));
        let item = SubmissionItem::new(SubmissionPayload::new("user-1", "1", "S1", 10));

        observer.on_item(0, &item);
        assert!(!pause.is_paused());
        observer.on_item(1, &item);
        assert!(pause.is_paused());
    }
}
