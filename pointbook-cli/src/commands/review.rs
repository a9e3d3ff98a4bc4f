//! Review command - list, confirm and cancel pending awards

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use dialoguer::Confirm;
use pointbook_core::services::{BatchResult, ReviewFilter, DEFAULT_PAGE_SIZE};

use super::{get_context, ids_from_args_or_stdin};
use crate::output;

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List pending awards, oldest first
    List {
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,
        /// Entries per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        /// Filter by text in account, reason or id
        #[arg(long)]
        search: Option<String>,
        /// Only this account
        #[arg(long)]
        account: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Confirm pending awards (ids as arguments or piped on stdin)
    Confirm {
        ids: Vec<String>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel pending awards (ids as arguments or piped on stdin)
    Cancel {
        ids: Vec<String>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: ReviewCommands) -> Result<()> {
    match command {
        ReviewCommands::List {
            page,
            page_size,
            search,
            account,
            json,
        } => list(page, page_size, search, account, json),
        ReviewCommands::Confirm { ids, yes, json } => resolve(ids, yes, json, true),
        ReviewCommands::Cancel { ids, yes, json } => resolve(ids, yes, json, false),
    }
}

fn list(
    page: usize,
    page_size: usize,
    search: Option<String>,
    account: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let filter = ReviewFilter {
        search,
        account_id: account,
        page: page.saturating_sub(1),
        page_size,
    };
    let result = ctx.review_service.list_pending(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.entries.is_empty() {
        println!("No pending awards.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "Transaction", "Account", "Points", "Product", "Store", "Price", "Photo", "Account pending/confirmed", "Created",
    ]);
    for entry in &result.entries {
        let tx = &entry.transaction;
        let (product, store, price, photo) = match &entry.submission {
            Some(s) => (
                s.product_id.clone(),
                s.store_id.clone(),
                s.price.to_string(),
                if s.image_url.is_some() { "yes" } else { "no" },
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string(), "-"),
        };
        table.add_row(vec![
            Cell::new(tx.id),
            Cell::new(&tx.account_id),
            Cell::new(tx.amount),
            Cell::new(product),
            Cell::new(store),
            Cell::new(price),
            Cell::new(photo),
            Cell::new(format!(
                "{}/{}",
                entry.account_pending_points, entry.account_confirmed_points
            )),
            Cell::new(tx.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{}", table);
    println!(
        "Page {} of {} ({} pending)",
        result.page + 1,
        result.total_pages().max(1),
        result.total
    );
    Ok(())
}

fn resolve(ids: Vec<String>, yes: bool, json: bool, confirm: bool) -> Result<()> {
    let ids = ids_from_args_or_stdin(ids)?;
    if ids.is_empty() {
        anyhow::bail!("No transaction IDs provided. Pass them as arguments or pipe them on stdin.");
    }

    let verb = if confirm { "Confirm" } else { "Cancel" };
    if !yes && !json && atty::is(atty::Stream::Stdin) {
        let proceed = Confirm::new()
            .with_prompt(format!("{} {} pending award(s)?", verb, ids.len()))
            .default(false)
            .interact()?;
        if !proceed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let ctx = get_context()?;
    let result = if confirm {
        ctx.review_service.confirm_many(&ids)
    } else {
        ctx.review_service.cancel_many(&ids)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_batch(&result, if confirm { "Confirmed" } else { "Cancelled" });
    }

    if result.failed > 0 {
        anyhow::bail!("{} of {} id(s) failed", result.failed, ids.len());
    }
    Ok(())
}

fn print_batch(result: &BatchResult, done: &str) {
    if result.succeeded > 0 {
        output::success(&format!("{} {} award(s)", done, result.succeeded));
    }
    for entry in result.results.iter().filter(|r| !r.success) {
        println!(
            "  {} {}: {}",
            "x".red(),
            entry.transaction_id,
            entry.error.as_deref().unwrap_or("unknown error")
        );
    }
}
