//! Price submission domain model

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Mean Earth radius used for haversine distances
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

/// A store where prices are observed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub store_id: String,
    pub name: String,
    /// Registered coordinates, used by the geofence check
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn new(store_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            name: name.into(),
            location: None,
            created_at: Utc::now(),
        }
    }
}

/// A price observation as it goes through verification
///
/// `photo` is only held in memory; once uploaded the durable location is kept
/// in `image_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub account_id: String,
    pub product_id: String,
    pub store_id: String,
    /// Observed price in minor currency units
    pub price: i64,
    #[serde(skip)]
    pub photo: Option<Vec<u8>>,
    pub image_url: Option<String>,
    pub device_location: Option<GeoPoint>,
    pub discount_period: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(
        account_id: impl Into<String>,
        product_id: impl Into<String>,
        store_id: impl Into<String>,
        price: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            product_id: product_id.into(),
            store_id: store_id.into(),
            price,
            photo: None,
            image_url: None,
            device_location: None,
            discount_period: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_photo(mut self, photo: Vec<u8>) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.device_location = Some(location);
        self
    }
}

/// What a caller hands to the submission queue for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub account_id: String,
    pub product_id: String,
    pub store_id: String,
    pub price: i64,
    /// Photo on local disk; read when the item is processed
    #[serde(default)]
    pub photo_path: Option<PathBuf>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub discount_period: Option<String>,
}

impl SubmissionPayload {
    pub fn new(
        account_id: impl Into<String>,
        product_id: impl Into<String>,
        store_id: impl Into<String>,
        price: i64,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            product_id: product_id.into(),
            store_id: store_id.into(),
            price,
            photo_path: None,
            latitude: None,
            longitude: None,
            discount_period: None,
        }
    }

    pub fn with_photo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.photo_path = Some(path.into());
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Device location, only when both coordinates are present
    pub fn device_location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    /// Check field shapes before any I/O happens for this payload
    pub fn validate(&self) -> Result<(), String> {
        let id_re = Regex::new(r"^[A-Za-z0-9._:-]{1,64}$").map_err(|e| e.to_string())?;

        if self.account_id.trim().is_empty() {
            return Err("account id cannot be empty".to_string());
        }
        if !id_re.is_match(&self.product_id) {
            return Err(format!("invalid product id '{}'", self.product_id));
        }
        if !id_re.is_match(&self.store_id) {
            return Err(format!("invalid store id '{}'", self.store_id));
        }
        if self.price <= 0 {
            return Err(format!("price must be positive, got {}", self.price));
        }
        if let Some(location) = self.device_location() {
            if !location.is_valid() {
                return Err(format!(
                    "coordinates out of range: {}, {}",
                    location.latitude, location.longitude
                ));
            }
        }
        Ok(())
    }

    /// Hash identifying redundant observations within one batch
    ///
    /// Uses: account_id, product_id, store_id and price.
    pub fn fingerprint(&self) -> String {
        let fingerprint_str = format!(
            "{}|{}|{}|{}",
            self.account_id.trim(),
            self.product_id.trim().to_lowercase(),
            self.store_id.trim().to_lowercase(),
            self.price
        );

        // SHA256 hash, truncated to 16 chars
        let mut hasher = Sha256::new();
        hasher.update(fingerprint_str.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }

    /// Build the domain submission (photo bytes are attached separately)
    pub fn to_submission(&self) -> Submission {
        let mut submission = Submission::new(
            self.account_id.trim(),
            self.product_id.trim(),
            self.store_id.trim(),
            self.price,
        );
        submission.device_location = self.device_location();
        submission.discount_period = self.discount_period.clone();
        submission
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_between_nearby_points() {
        // Two points roughly 1.1 km apart along a meridian
        let a = GeoPoint::new(37.5665, 126.9780);
        let b = GeoPoint::new(37.5765, 126.9780);
        let d = a.distance_meters(&b);
        assert!((d - 1112.0).abs() < 5.0, "distance was {}", d);
        assert_eq!(a.distance_meters(&a), 0.0);
    }

    #[test]
    fn test_fingerprint_ignores_case_and_whitespace() {
        let a = SubmissionPayload::new("user-1", "1234567", "S1", 9990);
        let b = SubmissionPayload::new("user-1", " 1234567 ", "s1", 9990);
        let c = SubmissionPayload::new("user-1", "1234567", "S1", 8990);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_payload_validation() {
        assert!(SubmissionPayload::new("user-1", "1234567", "S1", 9990).validate().is_ok());
        assert!(SubmissionPayload::new("user-1", "1234567", "S1", 0).validate().is_err());
        assert!(SubmissionPayload::new("user-1", "bad id!", "S1", 10).validate().is_err());
        assert!(SubmissionPayload::new("user-1", "1234567", "S1", 10)
            .with_location(120.0, 0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_device_location_needs_both_coordinates() {
        let mut payload = SubmissionPayload::new("user-1", "1234567", "S1", 9990);
        payload.latitude = Some(37.0);
        assert!(payload.device_location().is_none());
        payload.longitude = Some(127.0);
        assert_eq!(payload.device_location(), Some(GeoPoint::new(37.0, 127.0)));
    }
}
