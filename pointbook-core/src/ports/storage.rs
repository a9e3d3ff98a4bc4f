//! Image storage port

use crate::domain::result::Result;

/// Durable blob storage for submission photos
pub trait ImageStorage: Send + Sync {
    /// Store the image and return a durable URL for it
    ///
    /// Failure aborts only the queue item being processed.
    fn upload(&self, image: &[u8], content_type: &str) -> Result<String>;
}
