//! Submit command - one price report through the queue

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use pointbook_core::domain::{ItemStatus, SubmissionPayload};

use super::get_context;
use crate::output;

pub struct SubmitArgs {
    pub account: String,
    pub product: String,
    pub store: String,
    pub price: i64,
    pub photo: Option<PathBuf>,
    pub location: Option<(f64, f64)>,
    pub discount_period: Option<String>,
}

pub fn run(args: SubmitArgs, json: bool) -> Result<()> {
    let ctx = get_context()?;

    let mut payload = SubmissionPayload::new(args.account, args.product, args.store, args.price);
    payload.photo_path = args.photo;
    payload.discount_period = args.discount_period;
    if let Some((lat, lon)) = args.location {
        payload = payload.with_location(lat, lon);
    }

    let item = ctx.queue.submit(payload);

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else if let Some(outcome) = item.outcome.as_ref().filter(|_| item.status == ItemStatus::Succeeded) {
        match (outcome.transaction_id, outcome.auto_confirmed) {
            (Some(tx), true) => output::success(&format!(
                "Accepted: {} points confirmed (transaction {})",
                outcome.points_awarded, tx
            )),
            (Some(tx), false) => output::warning(&format!(
                "Accepted: {} points pending review (transaction {})",
                outcome.points_awarded, tx
            )),
            (None, _) => output::info("Accepted without points"),
        }
        for notice in &outcome.notices {
            println!("  {} {}", "note:".yellow(), notice);
        }
    }

    if item.status == ItemStatus::Failed {
        anyhow::bail!(
            "Submission failed: {}",
            item.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
