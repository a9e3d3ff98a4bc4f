//! HTTP price-tag classifier client
//!
//! Talks to the external classification service:
//! - `POST {base}/verify` with the raw image returns `{ "valid": bool, "reason": "..." }`
//! - `POST {base}/extract` with the raw image returns the extracted price-tag fields
//!
//! The service is slow and flaky. Gateway errors and refused connections mean
//! it could not judge the image at all; those become
//! [`ImageVerdict::Unavailable`] so the award waits for review.

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use url::Url;

use crate::domain::result::{Error, Result};
use crate::domain::{ImageVerdict, PriceTagReport};
use crate::ports::ImageClassifier;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractResponse {
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_price")]
    current_price: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_price")]
    original_price: Option<i64>,
    #[serde(default)]
    discount_period: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<ExtractResponse> for PriceTagReport {
    fn from(r: ExtractResponse) -> Self {
        PriceTagReport {
            product_id: r.product_id.filter(|s| !s.trim().is_empty()),
            product_name: r.product_name.filter(|s| !s.trim().is_empty()),
            current_price: r.current_price,
            original_price: r.original_price,
            discount_period: r.discount_period.filter(|s| !s.trim().is_empty()),
            error: r.error,
        }
    }
}

/// Price that can be a number or a string like "9,990"
///
/// Unreadable prices come back as `None` rather than failing the whole report.
fn deserialize_price<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<JsonValue> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_i64().filter(|p| *p > 0),
        Some(JsonValue::String(s)) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse::<i64>().ok().filter(|p| *p > 0)
        }
        _ => None,
    })
}

/// Blocking HTTP classifier with a per-call timeout
#[derive(Debug)]
pub struct HttpClassifier {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            anyhow::bail!("Classifier base URL cannot be empty");
        }
        // Trailing slash so join() appends instead of replacing the last segment
        let base_url = Url::parse(&format!("{}/", trimmed))
            .with_context(|| format!("Invalid classifier URL '{}'", base_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("Classifier URL must be http or https, got '{}'", base_url.scheme());
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn post_image(&self, endpoint: &str, image: &[u8]) -> std::result::Result<Response, reqwest::Error> {
        let url = self
            .base_url
            .join(endpoint)
            .unwrap_or_else(|_| self.base_url.clone());
        self.client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, OCTET_STREAM)
            .body(image.to_vec())
            .send()
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::ClassifierUnavailable(format!(
                "Classifier timed out after {:.1}s",
                self.timeout.as_secs_f64()
            ))
        } else if error.is_connect() {
            Error::ClassifierUnavailable("Unable to connect to the classifier".to_string())
        } else {
            Error::ClassifierUnavailable(format!("Classifier request failed: {}", error))
        }
    }
}

/// Gateway statuses meaning the service is down rather than broken
fn is_unavailable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

impl ImageClassifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    fn extract(&self, image: &[u8]) -> Result<PriceTagReport> {
        let response = self
            .post_image("extract", image)
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ClassifierUnavailable(format!(
                "Classifier extract failed: HTTP {}",
                status.as_u16()
            )));
        }

        let body: ExtractResponse = response
            .json()
            .map_err(|e| Error::Other(format!("Malformed classifier response: {}", e)))?;
        Ok(body.into())
    }

    fn verify(&self, image: &[u8]) -> Result<ImageVerdict> {
        let response = match self.post_image("verify", image) {
            Ok(response) => response,
            Err(e) if e.is_connect() && !e.is_timeout() => {
                tracing::warn!(url = %self.base_url, "classifier unreachable");
                return Ok(ImageVerdict::Unavailable {
                    reason: "Classifier is unreachable".to_string(),
                });
            }
            Err(e) => return Err(self.map_request_error(e)),
        };

        let status = response.status();
        if is_unavailable_status(status) {
            tracing::warn!(status = status.as_u16(), "classifier unavailable");
            return Ok(ImageVerdict::Unavailable {
                reason: format!("Classifier unavailable (HTTP {})", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(Error::ClassifierUnavailable(format!(
                "Classifier verify failed: HTTP {}",
                status.as_u16()
            )));
        }

        let body: VerifyResponse = response
            .json()
            .map_err(|e| Error::Other(format!("Malformed classifier response: {}", e)))?;

        if body.valid {
            Ok(ImageVerdict::Valid)
        } else {
            Ok(ImageVerdict::Rejected {
                reason: body
                    .reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "Image did not pass verification".to_string()),
            })
        }
    }
}
