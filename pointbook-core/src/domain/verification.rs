//! Verification outcomes

use serde::{Deserialize, Serialize};

/// Classifier judgement on a submitted photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ImageVerdict {
    /// Photo looks like a genuine price tag
    Valid,
    /// Photo failed the authenticity check
    Rejected { reason: String },
    /// Classifier was reachable-in-principle but could not judge right now.
    /// Distinct from Rejected: the award is parked for human review.
    Unavailable { reason: String },
}

/// Best-effort fields extracted from a price-tag photo
///
/// Every field may be missing; `error` carries the classifier's own message
/// when extraction partially failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTagReport {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub current_price: Option<i64>,
    #[serde(default)]
    pub original_price: Option<i64>,
    #[serde(default)]
    pub discount_period: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PriceTagReport {
    /// True when nothing usable came back
    pub fn is_empty(&self) -> bool {
        self.product_id.is_none()
            && self.product_name.is_none()
            && self.current_price.is_none()
            && self.original_price.is_none()
            && self.discount_period.is_none()
    }
}

/// Result of running one submission through the verification pipeline
///
/// Produced once per submission and consumed to drive the ledger calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_valid_image: bool,
    pub is_duplicate: bool,
    pub award_points: bool,
    pub points_to_award: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_warning: Option<String>,
    /// The image could not be judged; any award stays Pending for review
    pub review_required: bool,
    /// Reason passed through from the classifier on hard rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl VerificationResult {
    /// Non-blocking notices to show alongside the outcome
    pub fn notices(&self) -> Vec<String> {
        let mut notices = Vec::new();
        if self.is_duplicate {
            notices.push(
                "Same price was already reported recently for this product and store; no points awarded"
                    .to_string(),
            );
        }
        if let Some(warning) = &self.location_warning {
            notices.push(warning.clone());
        }
        if self.review_required && self.award_points {
            notices.push("Points are pending manual review".to_string());
        }
        notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_json_shape() {
        let json = serde_json::to_value(ImageVerdict::Rejected {
            reason: "blurry".to_string(),
        })
        .unwrap();
        assert_eq!(json["verdict"], "rejected");
        assert_eq!(json["reason"], "blurry");

        let parsed: ImageVerdict = serde_json::from_str(r#"{"verdict":"valid"}"#).unwrap();
        assert_eq!(parsed, ImageVerdict::Valid);
    }

    #[test]
    fn test_partial_report_parses() {
        let report: PriceTagReport =
            serde_json::from_str(r#"{"productName":"Milk 1L","currentPrice":2990}"#).unwrap();
        assert_eq!(report.product_name.as_deref(), Some("Milk 1L"));
        assert_eq!(report.current_price, Some(2990));
        assert!(report.product_id.is_none());
        assert!(!report.is_empty());
        assert!(PriceTagReport::default().is_empty());
    }
}
