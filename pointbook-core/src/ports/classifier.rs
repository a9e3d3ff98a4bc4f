//! Image classifier port
//!
//! Defines the interface to the external price-tag classifier. The service is
//! slow and unreliable; callers must handle partial reports and outright
//! failure.

use crate::domain::result::Result;
use crate::domain::{ImageVerdict, PriceTagReport};

/// Price-tag image classifier
///
/// Implementations talk to the real classification service (HTTP) or stand in
/// for it in tests. The VerificationPipeline uses this trait without knowing
/// which one it has.
pub trait ImageClassifier: Send + Sync {
    /// Classifier name (e.g., "http")
    fn name(&self) -> &str;

    /// Extract whatever price-tag fields can be read from the image
    ///
    /// Used to prefill a submission before the user confirms it.
    fn extract(&self, image: &[u8]) -> Result<PriceTagReport>;

    /// Judge whether the image is an authentic price-tag photo
    ///
    /// `Ok(ImageVerdict::Unavailable)` means the service could not judge and
    /// the award should wait for review. `Err` means the call itself broke
    /// (timeout, malformed response) and the current item should fail.
    fn verify(&self, image: &[u8]) -> Result<ImageVerdict>;
}
