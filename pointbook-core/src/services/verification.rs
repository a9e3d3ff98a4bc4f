//! Verification pipeline - decides whether a submission earns points
//!
//! Checks run in order: duplicate suppression, image validity, geofence.
//! Only an image rejection blocks the submission; duplicates are stored
//! without reward and a distant device location is just a warning.

use std::sync::Arc;

use chrono::Duration;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::PointsSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{ImageVerdict, PriceTagReport, Submission, VerificationResult};
use crate::ports::ImageClassifier;

pub struct VerificationPipeline {
    repository: Arc<DuckDbRepository>,
    classifier: Arc<dyn ImageClassifier>,
    settings: PointsSettings,
}

impl VerificationPipeline {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        classifier: Arc<dyn ImageClassifier>,
        settings: PointsSettings,
    ) -> Self {
        Self {
            repository,
            classifier,
            settings,
        }
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Judge one submission
    ///
    /// `Err` only when a check could not run at all (database failure, or
    /// the classifier call broke in a way that isn't plain unavailability).
    pub fn verify(&self, submission: &Submission) -> Result<VerificationResult> {
        let is_duplicate = self.is_duplicate(submission)?;

        let (is_valid_image, review_required, rejection_reason) = match &submission.photo {
            None => (true, true, None),
            Some(photo) => match self.classifier.verify(photo)? {
                ImageVerdict::Valid => (true, false, None),
                ImageVerdict::Rejected { reason } => (false, false, Some(reason)),
                ImageVerdict::Unavailable { reason } => {
                    tracing::warn!(submission_id = %submission.id, %reason, "image not judged, routing to review");
                    (true, true, None)
                }
            },
        };

        if !is_valid_image {
            return Ok(VerificationResult {
                is_valid_image: false,
                is_duplicate,
                award_points: false,
                points_to_award: 0,
                location_warning: None,
                review_required: false,
                rejection_reason,
            });
        }

        let location_warning = self.location_warning(submission)?;
        let award_points = !is_duplicate;

        Ok(VerificationResult {
            is_valid_image,
            is_duplicate,
            award_points,
            points_to_award: if award_points { self.settings.base_award } else { 0 },
            location_warning,
            review_required,
            rejection_reason: None,
        })
    }

    /// Best-effort price-tag fields for prefilling a submission
    pub fn prefill(&self, photo: &[u8]) -> Result<PriceTagReport> {
        if photo.is_empty() {
            return Err(Error::validation("photo is empty"));
        }
        self.classifier.extract(photo)
    }

    /// Same price already reported for this product and store inside the window
    ///
    /// Read-then-decide: two concurrent identical reports can both pass.
    fn is_duplicate(&self, submission: &Submission) -> Result<bool> {
        let since = submission.created_at - Duration::hours(self.settings.duplicate_window_hours);
        let latest = self
            .repository
            .latest_submission_since(&submission.product_id, &submission.store_id, since)
            .map_err(|e| Error::database(format!("{:#}", e)))?;

        Ok(matches!(latest, Some(prior) if prior.id != submission.id && prior.price == submission.price))
    }

    fn location_warning(&self, submission: &Submission) -> Result<Option<String>> {
        let Some(device) = submission.device_location else {
            return Ok(None);
        };
        let store = self
            .repository
            .get_store(&submission.store_id)
            .map_err(|e| Error::database(format!("{:#}", e)))?;
        let Some(store_location) = store.and_then(|s| s.location) else {
            return Ok(None);
        };

        let distance = device.distance_meters(&store_location);
        if distance > self.settings.geofence_radius_meters {
            Ok(Some(format!(
                "Reported from {:.0} m away from store {} (limit {:.0} m)",
                distance, submission.store_id, self.settings.geofence_radius_meters
            )))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::domain::{GeoPoint, Store};

    /// Classifier returning scripted verdicts in order, then Valid
    struct ScriptedClassifier {
        verdicts: Mutex<Vec<Result<ImageVerdict>>>,
    }

    impl ScriptedClassifier {
        fn new(mut verdicts: Vec<Result<ImageVerdict>>) -> Self {
            verdicts.reverse();
            Self {
                verdicts: Mutex::new(verdicts),
            }
        }
    }

    impl ImageClassifier for ScriptedClassifier {
        fn name(&self) -> &str {
            "scripted"
        }

        fn extract(&self, _image: &[u8]) -> Result<PriceTagReport> {
            Ok(PriceTagReport {
                current_price: Some(9990),
                ..PriceTagReport::default()
            })
        }

        fn verify(&self, _image: &[u8]) -> Result<ImageVerdict> {
            self.verdicts.lock().unwrap().pop().unwrap_or(Ok(ImageVerdict::Valid))
        }
    }

    fn setup(verdicts: Vec<Result<ImageVerdict>>) -> (Arc<DuckDbRepository>, VerificationPipeline) {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let pipeline = VerificationPipeline::new(
            Arc::clone(&repo),
            Arc::new(ScriptedClassifier::new(verdicts)),
            PointsSettings::default(),
        );
        (repo, pipeline)
    }

    fn submission(price: i64) -> Submission {
        Submission::new("user-1", "1234567", "S1", price).with_photo(vec![0xFF, 0xD8, 0xFF])
    }

    #[test]
    fn test_valid_image_awards_base_points() {
        let (_repo, pipeline) = setup(vec![]);
        let result = pipeline.verify(&submission(9990)).unwrap();
        assert!(result.is_valid_image);
        assert!(result.award_points);
        assert!(!result.review_required);
        assert_eq!(result.points_to_award, 5);
    }

    #[test]
    fn test_duplicate_price_within_window() {
        let (repo, pipeline) = setup(vec![]);
        repo.insert_submission(&submission(9990)).unwrap();

        let second = pipeline.verify(&submission(9990)).unwrap();
        assert!(second.is_duplicate);
        assert!(!second.award_points);
        assert_eq!(second.points_to_award, 0);

        repo.insert_submission(&submission(9990)).unwrap();
        let third = pipeline.verify(&submission(8990)).unwrap();
        assert!(!third.is_duplicate);
        assert_eq!(third.points_to_award, 5);
    }

    #[test]
    fn test_same_price_outside_window_is_not_duplicate() {
        let (repo, pipeline) = setup(vec![]);
        let mut old = submission(9990);
        old.created_at = old.created_at - Duration::hours(25);
        repo.insert_submission(&old).unwrap();

        assert!(!pipeline.verify(&submission(9990)).unwrap().is_duplicate);
    }

    #[test]
    fn test_rejected_image_blocks_award() {
        let (_repo, pipeline) = setup(vec![Ok(ImageVerdict::Rejected {
            reason: "screen photo".to_string(),
        })]);
        let result = pipeline.verify(&submission(9990)).unwrap();
        assert!(!result.is_valid_image);
        assert!(!result.award_points);
        assert_eq!(result.points_to_award, 0);
        assert_eq!(result.rejection_reason.as_deref(), Some("screen photo"));
    }

    #[test]
    fn test_unavailable_classifier_requires_review() {
        let (_repo, pipeline) = setup(vec![Ok(ImageVerdict::Unavailable {
            reason: "503".to_string(),
        })]);
        let result = pipeline.verify(&submission(9990)).unwrap();
        assert!(result.is_valid_image);
        assert!(result.review_required);
        assert_eq!(result.points_to_award, 5);
    }

    #[test]
    fn test_missing_photo_requires_review() {
        let (_repo, pipeline) = setup(vec![]);
        let result = pipeline
            .verify(&Submission::new("user-1", "1234567", "S1", 9990))
            .unwrap();
        assert!(result.review_required);
        assert!(result.award_points);
    }

    #[test]
    fn test_classifier_error_propagates() {
        let (_repo, pipeline) = setup(vec![Err(Error::ClassifierUnavailable(
            "timed out".to_string(),
        ))]);
        assert!(pipeline.verify(&submission(9990)).is_err());
    }

    #[test]
    fn test_geofence_warning_is_not_blocking() {
        let (repo, pipeline) = setup(vec![]);
        let mut store = Store::new("S1", "Corner Mart");
        store.location = Some(GeoPoint::new(37.5665, 126.9780));
        repo.upsert_store(&store).unwrap();

        let near = submission(9990).with_location(GeoPoint::new(37.5667, 126.9781));
        assert!(pipeline.verify(&near).unwrap().location_warning.is_none());

        let far = submission(8990).with_location(GeoPoint::new(37.5765, 126.9780));
        let result = pipeline.verify(&far).unwrap();
        assert!(result.location_warning.is_some());
        assert!(result.award_points);
    }

    #[test]
    fn test_prefill_uses_extract() {
        let (_repo, pipeline) = setup(vec![]);
        assert_eq!(pipeline.prefill(b"img").unwrap().current_price, Some(9990));
        assert!(pipeline.prefill(b"").is_err());
    }
}
