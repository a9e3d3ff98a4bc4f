//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod queue;
pub mod result;
mod submission;
mod transaction;
mod verification;

pub use account::PointAccount;
pub use queue::{ItemOutcome, ItemStatus, QueueRunState, QueueSummary, SubmissionItem};
pub use submission::{GeoPoint, Store, Submission, SubmissionPayload};
pub use transaction::{
    PointsTransaction, TransactionFilter, TransactionStatus, REASON_MANUAL_ADJUSTMENT,
    REASON_PRICE_SUBMISSION,
};
pub use verification::{ImageVerdict, PriceTagReport, VerificationResult};
