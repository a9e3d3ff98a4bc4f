//! Status command - ledger and submission summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_context;
use crate::output::{create_table, format_size};

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Pointbook Status".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec!["Accounts", &status.total_accounts.to_string()]);
    table.add_row(vec!["Submissions", &status.total_submissions.to_string()]);
    table.add_row(vec!["Stores", &status.total_stores.to_string()]);
    for totals in [&status.pending, &status.confirmed, &status.cancelled] {
        table.add_row(vec![
            format!("{} transactions", totals.status),
            format!("{} ({} points)", totals.count, totals.points),
        ]);
    }
    table.add_row(vec!["Database size", &format_size(status.db_size_bytes)]);
    println!("{}", table);

    if !status.top_accounts.is_empty() {
        println!();
        println!("{}", "Top Accounts".bold());
        let mut accounts = create_table();
        accounts.set_header(vec!["Account", "Pending", "Confirmed"]);
        for account in &status.top_accounts {
            accounts.add_row(vec![
                account.account_id.clone(),
                account.pending_points.to_string(),
                account.confirmed_points.to_string(),
            ]);
        }
        println!("{}", accounts);
    }

    Ok(())
}
