//! Scan command - extract price tag fields from a photo

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table};
use pointbook_core::OperationResult;

use super::get_context;
use crate::output;

pub fn run(photo: &Path, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let bytes =
        std::fs::read(photo).with_context(|| format!("Failed to read {}", photo.display()))?;

    let extracted = ctx.pipeline.prefill(&bytes);

    if json {
        let result = OperationResult::from(extracted);
        println!("{}", serde_json::to_string_pretty(&result)?);
        if let Some(error) = result.error {
            anyhow::bail!(error);
        }
        return Ok(());
    }

    let report = extracted?;

    if report.is_empty() {
        output::warning(report.error.as_deref().unwrap_or("Nothing readable on this tag"));
        return Ok(());
    }

    let show = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec!["Product".to_string(), show(report.product_id.clone())]);
    table.add_row(vec!["Name".to_string(), show(report.product_name.clone())]);
    table.add_row(vec!["Price".to_string(), show(report.current_price.map(|p| p.to_string()))]);
    table.add_row(vec![
        "Original price".to_string(),
        show(report.original_price.map(|p| p.to_string())),
    ]);
    table.add_row(vec!["Discount period".to_string(), show(report.discount_period.clone())]);
    println!("{}", table);

    if let Some(error) = &report.error {
        output::warning(error);
    }
    Ok(())
}
