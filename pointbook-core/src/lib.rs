//! Pointbook Core - points ledger and anti-fraud verification for price reports
//!
//! This crate follows a hexagonal layout:
//!
//! - **domain**: Accounts, transactions, submissions and queue state
//! - **ports**: Traits for the image classifier and image storage
//! - **services**: Ledger, verification pipeline, submission queue, review
//! - **adapters**: DuckDB persistence, HTTP classifier, local image storage

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use adapters::{HttpClassifier, LocalImageStorage};
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{
    PointAccount, PointsTransaction, QueueRunState, QueueSummary, Submission, SubmissionPayload,
    TransactionStatus,
};

pub const DB_FILE: &str = "pointbook.duckdb";

/// Main context for Pointbook operations
///
/// Wires the repository, the configured classifier and storage adapters, and
/// every service on top of them. Services share the repository and the ledger.
pub struct PointbookContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub repository: Arc<DuckDbRepository>,
    pub ledger: Arc<PointsLedger>,
    pub pipeline: Arc<VerificationPipeline>,
    pub queue: SubmissionQueue,
    pub review_service: ReviewService,
    pub import_service: ImportService,
    pub audit_service: AuditService,
    pub status_service: StatusService,
}

impl PointbookContext {
    /// Open (or create) the data directory and build every service
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let config = Config::load(data_dir)?;
        config.validate()?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILE))?);
        repository.ensure_schema()?;

        let classifier = Arc::new(HttpClassifier::new(
            &config.classifier.base_url,
            config.classifier_timeout(),
        )?);
        let storage = Arc::new(LocalImageStorage::new(config.image_dir(data_dir)));

        let ledger = Arc::new(PointsLedger::new(Arc::clone(&repository)));
        let pipeline = Arc::new(VerificationPipeline::new(
            Arc::clone(&repository),
            classifier,
            config.points.clone(),
        ));
        let queue = SubmissionQueue::new(
            Arc::clone(&repository),
            Arc::clone(&pipeline),
            Arc::clone(&ledger),
            storage,
            config.item_delay(),
        );

        let review_service = ReviewService::new(Arc::clone(&repository), Arc::clone(&ledger));
        let import_service = ImportService::new();
        let audit_service = AuditService::new(Arc::clone(&repository));
        let status_service = StatusService::new(Arc::clone(&repository));

        tracing::debug!(data_dir = %data_dir.display(), "pointbook context ready");

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            repository,
            ledger,
            pipeline,
            queue,
            review_service,
            import_service,
            audit_service,
            status_service,
        })
    }
}
