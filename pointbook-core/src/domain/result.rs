//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    /// Non-positive amount passed to the ledger. Rejected before any mutation.
    #[error("Invalid amount: {0} (points must be a positive integer)")]
    InvalidAmount(i64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Hard rejection by the image classifier. The reason is shown to the user.
    #[error("Image rejected: {0}")]
    InvalidImage(String),

    #[error("Storage upload failed: {0}")]
    StorageUploadFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a successful result with context
    pub fn ok_with_context(data: T, context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: Some(context),
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i64> = OperationResult::ok(5);
        assert!(result.success);
        assert_eq!(result.data, Some(5));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result() {
        let err: Result<i64> = Err(Error::InvalidAmount(0));
        let result: OperationResult<i64> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid amount: 0"));
    }

    #[test]
    fn test_invalid_image_message_keeps_reason() {
        let err = Error::InvalidImage("screen capture detected".to_string());
        assert_eq!(err.to_string(), "Image rejected: screen capture detected");
    }
}
