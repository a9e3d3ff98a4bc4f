//! Import and resume commands - CSV batches through the submission queue
//!
//! A run that pauses is written to `queue/current.json` in the data
//! directory; `pb resume` picks it up from the next unprocessed item.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use pointbook_core::domain::QueueRunState;
use pointbook_core::services::{
    ColumnMappings, ImportOptions, LogEvent, LoggingService, PauseHandle, QueueStateFile,
};
use pointbook_core::PointbookContext;
use serde_json::json;

use super::{get_context, log_event};
use crate::output::{self, item_status_cell, print_queue_summary, ProgressObserver};

pub struct ImportArgs {
    pub file: PathBuf,
    pub account: Option<String>,
    pub decimal_prices: bool,
    pub preview: bool,
    pub pause_after: Option<usize>,
    pub replace: bool,
    pub product_column: Option<String>,
    pub store_column: Option<String>,
    pub price_column: Option<String>,
    pub photo_column: Option<String>,
    pub json: bool,
}

fn state_file(ctx: &PointbookContext) -> QueueStateFile {
    QueueStateFile::new(ctx.data_dir.join("queue").join("current.json"))
}

pub fn run(args: ImportArgs, logger: &Option<LoggingService>) -> Result<()> {
    let ctx = get_context()?;
    let state_file = state_file(&ctx);

    if !args.preview && state_file.exists() && !args.replace {
        anyhow::bail!(
            "A paused run exists at {}. Run `pb resume`, or pass --replace to discard it.",
            state_file.path().display()
        );
    }

    let options = ImportOptions {
        mappings: ColumnMappings {
            product_id: args.product_column,
            store_id: args.store_column,
            price: args.price_column,
            photo: args.photo_column,
            ..ColumnMappings::default()
        },
        default_account_id: args.account,
        decimal_prices: args.decimal_prices,
    };
    let result = ctx.import_service.import(&args.file, &options)?;

    if args.preview {
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "import": &result,
                    "items": &result.state.items,
                }))?
            );
            return Ok(());
        }
        let mut table = output::create_table();
        table.set_header(vec!["#", "Account", "Product", "Store", "Price", "Photo", "Status"]);
        for (i, item) in result.state.items.iter().enumerate() {
            let p = &item.payload;
            table.add_row(vec![
                comfy_table::Cell::new(i + 1),
                comfy_table::Cell::new(&p.account_id),
                comfy_table::Cell::new(&p.product_id),
                comfy_table::Cell::new(&p.store_id),
                comfy_table::Cell::new(p.price),
                comfy_table::Cell::new(
                    p.photo_path
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_default(),
                ),
                item_status_cell(item.status),
            ]);
        }
        println!("{}", table);
        print_rejected(&result.rejected);
        return Ok(());
    }

    if !args.json {
        output::info(&format!(
            "{} row(s) read: {} queued, {} repeated, {} rejected",
            result.discovered,
            result.queued,
            result.skipped,
            result.rejected.len()
        ));
        print_rejected(&result.rejected);
    }

    state_file.remove()?;
    execute(&ctx, &state_file, result.state, args.pause_after, args.json, logger)
}

pub fn resume(pause_after: Option<usize>, json: bool, logger: &Option<LoggingService>) -> Result<()> {
    let ctx = get_context()?;
    let state_file = state_file(&ctx);
    let Some(state) = state_file.load()? else {
        anyhow::bail!("No paused run to resume");
    };

    if !json {
        output::info(&format!(
            "Resuming run {} at item {} of {}",
            state.run_id,
            state.current_index + 1,
            state.len()
        ));
    }
    execute(&ctx, &state_file, state, pause_after, json, logger)
}

fn execute(
    ctx: &PointbookContext,
    state_file: &QueueStateFile,
    state: QueueRunState,
    pause_after: Option<usize>,
    json: bool,
    logger: &Option<LoggingService>,
) -> Result<()> {
    let run_id = state.run_id;
    log_event(logger, LogEvent::new("queue_started").with_run(run_id));

    let pause = PauseHandle::new();
    // pause_after counts items of this invocation, not of the whole run
    let limit = pause_after.map(|n| state.current_index + n);
    let mut observer = if json {
        ProgressObserver::hidden(pause.clone(), limit)
    } else {
        ProgressObserver::new(state.len(), state.current_index, pause.clone(), limit)
    };

    let state = ctx.queue.run(state, &pause, &mut observer);
    observer.finish();
    let summary = state.summary();

    if state.paused {
        state_file.save(&state)?;
        log_event(logger, LogEvent::new("queue_paused").with_run(run_id));
    } else {
        state_file.remove()?;
        log_event(logger, LogEvent::new("queue_finished").with_run(run_id));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "summary": &summary,
            "items": &state.items,
        }))?);
        return Ok(());
    }

    print_queue_summary(&summary);
    if state.paused {
        println!(
            "{} before item {} of {}; run `pb resume` to continue",
            "Paused".yellow().bold(),
            state.current_index + 1,
            state.len()
        );
    }
    Ok(())
}

fn print_rejected(rejected: &[pointbook_core::services::RejectedRow]) {
    for row in rejected {
        output::warning(&format!("  line {}: {}", row.line, row.error));
    }
}
