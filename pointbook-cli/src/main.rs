//! Pointbook CLI - points ledger and price report verification

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pointbook_core::services::{LogEvent, LoggingService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

use commands::{audit, import, ledger, logs, review, scan, status, store, submit};

/// Pointbook - reward price reports, catch the fake ones
#[derive(Parser)]
#[command(name = "pb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show ledger and submission summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit one price report through verification
    Submit {
        /// Reporting user's account id
        #[arg(long)]
        account: String,
        /// Product identifier (barcode)
        #[arg(long)]
        product: String,
        /// Store identifier
        #[arg(long)]
        store: String,
        /// Observed price in minor units
        #[arg(long)]
        price: i64,
        /// Photo of the price tag
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Device latitude
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Device longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Discount period printed on the tag
        #[arg(long)]
        discount_period: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read a price tag photo and print the extracted fields
    Scan {
        /// Photo of the price tag
        photo: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import price reports from CSV and run them through the queue
    Import {
        /// Path to CSV file
        file: PathBuf,
        /// Account for rows without one
        #[arg(long)]
        account: Option<String>,
        /// Prices are in major units with cents (12.99)
        #[arg(long)]
        decimal_prices: bool,
        /// Parse and show the run without processing it
        #[arg(long)]
        preview: bool,
        /// Pause the run after this many items
        #[arg(long)]
        pause_after: Option<usize>,
        /// Discard a paused run instead of refusing to start
        #[arg(long)]
        replace: bool,
        /// Column name for the product id
        #[arg(long)]
        product_column: Option<String>,
        /// Column name for the store id
        #[arg(long)]
        store_column: Option<String>,
        /// Column name for the price
        #[arg(long)]
        price_column: Option<String>,
        /// Column name for the photo path
        #[arg(long)]
        photo_column: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resume a paused import run
    Resume {
        /// Pause again after this many items
        #[arg(long)]
        pause_after: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Review pending awards
    Review {
        #[command(subcommand)]
        command: review::ReviewCommands,
    },

    /// Work with ledger transactions directly
    Ledger {
        #[command(subcommand)]
        command: ledger::LedgerCommands,
    },

    /// Manage the store registry used by the geofence check
    Store {
        #[command(subcommand)]
        command: store::StoreCommands,
    },

    /// Check ledger consistency
    Audit {
        /// Flag pending awards older than this many days
        #[arg(long, default_value_t = pointbook_core::services::DEFAULT_STALE_AFTER_DAYS)]
        stale_days: i64,
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Status { .. } => "status",
            Commands::Submit { .. } => "submit",
            Commands::Scan { .. } => "scan",
            Commands::Import { .. } => "import",
            Commands::Resume { .. } => "resume",
            Commands::Review { .. } => "review",
            Commands::Ledger { .. } => "ledger",
            Commands::Store { .. } => "store",
            Commands::Audit { .. } => "audit",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let logger = commands::get_logger();
    let command_name = cli.command.name();
    commands::log_event(
        &logger,
        LogEvent::new("command_executed").with_command(command_name),
    );

    match run(cli, &logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::log_event(
                &logger,
                LogEvent::new("command_failed")
                    .with_command(command_name)
                    .with_error(e.to_string()),
            );
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, logger: &Option<LoggingService>) -> Result<()> {
    match cli.command {
        Commands::Status { json } => status::run(json),
        Commands::Submit {
            account,
            product,
            store,
            price,
            photo,
            lat,
            lon,
            discount_period,
            json,
        } => submit::run(
            submit::SubmitArgs {
                account,
                product,
                store,
                price,
                photo,
                location: lat.zip(lon),
                discount_period,
            },
            json,
        ),
        Commands::Scan { photo, json } => scan::run(&photo, json),
        Commands::Import {
            file,
            account,
            decimal_prices,
            preview,
            pause_after,
            replace,
            product_column,
            store_column,
            price_column,
            photo_column,
            json,
        } => import::run(import::ImportArgs {
            file,
            account,
            decimal_prices,
            preview,
            pause_after,
            replace,
            product_column,
            store_column,
            price_column,
            photo_column,
            json,
        }, logger),
        Commands::Resume { pause_after, json } => import::resume(pause_after, json, logger),
        Commands::Review { command } => review::run(command),
        Commands::Ledger { command } => ledger::run(command),
        Commands::Store { command } => store::run(command),
        Commands::Audit {
            stale_days,
            verbose,
            json,
        } => audit::run(stale_days, verbose, json),
        Commands::Logs { command } => logs::run(command, logger),
    }
}
