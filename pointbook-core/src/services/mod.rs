//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod audit;
pub mod import;
mod ledger;
pub mod logging;
pub mod migration;
mod queue;
mod review;
mod status;
mod verification;

pub use audit::{AuditResult, AuditService, AuditSummary, CheckResult, DEFAULT_STALE_AFTER_DAYS};
pub use import::{ColumnMappings, DetectedColumns, ImportOptions, ImportResult, ImportService, RejectedRow};
pub use ledger::PointsLedger;
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use queue::{NoopObserver, PauseHandle, QueueObserver, QueueStateFile, SubmissionQueue};
pub use review::{
    BatchResult, BatchResultEntry, ReviewEntry, ReviewFilter, ReviewPage, ReviewService,
    SubmissionSummary, DEFAULT_PAGE_SIZE,
};
pub use status::{AccountSummary, StatusService, StatusSummary};
pub use verification::VerificationPipeline;
