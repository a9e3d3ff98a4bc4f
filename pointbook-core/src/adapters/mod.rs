//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for ledger and submission persistence
//! - HTTP client for the ImageClassifier port
//! - Local filesystem for the ImageStorage port

pub mod duckdb;
pub mod http_classifier;
pub mod local_storage;

#[cfg(test)]
pub mod classifier_mock;

pub use http_classifier::HttpClassifier;
pub use local_storage::{sniff_content_type, LocalImageStorage};
