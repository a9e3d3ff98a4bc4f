//! Ledger command - manual awards and direct transaction access

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::Cell;
use pointbook_core::domain::{TransactionFilter, TransactionStatus, REASON_MANUAL_ADJUSTMENT};
use serde_json::json;
use uuid::Uuid;

use super::get_context;
use crate::output::{self, transaction_status_cell};

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Add a pending award
    Add {
        /// Account to credit
        account: String,
        /// Points (must be positive)
        amount: i64,
        /// Reason code
        #[arg(long, default_value = REASON_MANUAL_ADJUSTMENT)]
        reason: String,
        /// Submission or other record this award belongs to
        #[arg(long)]
        reference: Option<Uuid>,
        /// Confirm immediately after adding
        #[arg(long)]
        confirm: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Confirm a pending transaction
    Confirm {
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel a pending transaction
    Cancel {
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List transactions in one status
    List {
        /// pending, confirmed or cancelled
        #[arg(long, default_value = "pending")]
        status: String,
        /// Only this account
        #[arg(long)]
        account: Option<String>,
        /// Maximum rows
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show an account's balances
    Balance {
        account: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: LedgerCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        LedgerCommands::Add {
            account,
            amount,
            reason,
            reference,
            confirm,
            json,
        } => {
            let id = ctx.ledger.add(&account, amount, &reason, reference)?;
            let confirmed = confirm && ctx.ledger.confirm(id)?;
            if json {
                println!(
                    "{}",
                    json!({ "transaction_id": id, "amount": amount, "confirmed": confirmed })
                );
            } else if confirmed {
                output::success(&format!("Added and confirmed {} points ({})", amount, id));
            } else {
                output::success(&format!("Added {} pending points ({})", amount, id));
            }
        }
        LedgerCommands::Confirm { id, json } => {
            let applied = ctx.ledger.confirm(id)?;
            report_transition(id, applied, "confirmed", json);
        }
        LedgerCommands::Cancel { id, json } => {
            let applied = ctx.ledger.cancel(id)?;
            report_transition(id, applied, "cancelled", json);
        }
        LedgerCommands::List {
            status,
            account,
            limit,
            json,
        } => {
            let status: TransactionStatus = status
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid --status")?;
            let filter = TransactionFilter {
                account_id: account,
                limit: Some(limit),
                ..TransactionFilter::default()
            };
            let transactions = ctx.ledger.list_by_status(status, &filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&transactions)?);
                return Ok(());
            }
            if transactions.is_empty() {
                println!("No {} transactions.", status);
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Transaction", "Account", "Points", "Reason", "Status", "Created", "Resolved"]);
            for tx in &transactions {
                table.add_row(vec![
                    Cell::new(tx.id),
                    Cell::new(&tx.account_id),
                    Cell::new(tx.amount),
                    Cell::new(&tx.reason),
                    transaction_status_cell(tx.status),
                    Cell::new(tx.created_at.format("%Y-%m-%d %H:%M")),
                    Cell::new(
                        tx.resolved_at
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_default(),
                    ),
                ]);
            }
            println!("{}", table);
        }
        LedgerCommands::Balance { account, json } => {
            let balance = ctx.ledger.account(&account)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&balance)?);
            } else {
                println!("Account:   {}", balance.account_id);
                println!("Pending:   {}", balance.pending_points);
                println!("Confirmed: {}", balance.confirmed_points);
            }
        }
    }

    Ok(())
}

fn report_transition(id: Uuid, applied: bool, verb: &str, json: bool) {
    if json {
        println!("{}", json!({ "transaction_id": id, "applied": applied }));
    } else if applied {
        output::success(&format!("Transaction {} {}", id, verb));
    } else {
        output::warning(&format!("Transaction {} was already resolved; nothing changed", id));
    }
}
