//! Store command - registry of stores and their coordinates

use anyhow::Result;
use clap::Subcommand;
use pointbook_core::domain::{GeoPoint, Store};

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum StoreCommands {
    /// Add or update a store
    Add {
        /// Store identifier used in submissions
        id: String,
        /// Display name
        name: String,
        /// Store latitude
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Store longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// List registered stores
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: StoreCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        StoreCommands::Add { id, name, lat, lon } => {
            if id.trim().is_empty() {
                anyhow::bail!("Store id cannot be empty");
            }
            let mut store = Store::new(id.trim(), name.trim());
            if let Some((lat, lon)) = lat.zip(lon) {
                let location = GeoPoint::new(lat, lon);
                if !location.is_valid() {
                    anyhow::bail!("Coordinates out of range: {}, {}", lat, lon);
                }
                store.location = Some(location);
            }
            ctx.repository.upsert_store(&store)?;
            output::success(&format!("Saved store {}", store.store_id));
        }
        StoreCommands::List { json } => {
            let stores = ctx.repository.list_stores()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stores)?);
                return Ok(());
            }
            if stores.is_empty() {
                println!("No stores registered.");
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["Store", "Name", "Latitude", "Longitude"]);
            for store in &stores {
                let (lat, lon) = store
                    .location
                    .map(|l| (format!("{:.5}", l.latitude), format!("{:.5}", l.longitude)))
                    .unwrap_or_default();
                table.add_row(vec![store.store_id.clone(), store.name.clone(), lat, lon]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
