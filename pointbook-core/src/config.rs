//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "points": { "baseAward": 5, "duplicateWindowHours": 24, "geofenceRadiusMeters": 500.0 },
//!   "queue": { "itemDelayMs": 1000 },
//!   "classifier": { "baseUrl": "http://127.0.0.1:8088", "timeoutSecs": 30 },
//!   "storage": { "imageDir": null }
//! }
//! ```
//! Sections and keys this crate doesn't know about are kept on save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "settings.json";

/// Overrides `classifier.baseUrl`
pub const ENV_CLASSIFIER_URL: &str = "POINTBOOK_CLASSIFIER_URL";
/// Overrides `queue.itemDelayMs`
pub const ENV_ITEM_DELAY_MS: &str = "POINTBOOK_ITEM_DELAY_MS";

pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8088";

/// Award and anti-fraud thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsSettings {
    #[serde(default = "default_base_award")]
    pub base_award: i64,
    #[serde(default = "default_duplicate_window_hours")]
    pub duplicate_window_hours: i64,
    #[serde(default = "default_geofence_radius")]
    pub geofence_radius_meters: f64,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSettings {
    /// Pause between two processed items, throttles the classifier
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierSettings {
    #[serde(default = "default_classifier_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    /// Where uploaded photos go; `<data dir>/images` when unset
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

fn default_base_award() -> i64 {
    5
}

fn default_duplicate_window_hours() -> i64 {
    24
}

fn default_geofence_radius() -> f64 {
    500.0
}

fn default_item_delay_ms() -> u64 {
    1000
}

fn default_classifier_url() -> String {
    DEFAULT_CLASSIFIER_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PointsSettings {
    fn default() -> Self {
        Self {
            base_award: default_base_award(),
            duplicate_window_hours: default_duplicate_window_hours(),
            geofence_radius_meters: default_geofence_radius(),
            other: HashMap::new(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            item_delay_ms: default_item_delay_ms(),
            other: HashMap::new(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            base_url: default_classifier_url(),
            timeout_secs: default_timeout_secs(),
            other: HashMap::new(),
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    points: PointsSettings,
    #[serde(default)]
    queue: QueueSettings,
    #[serde(default)]
    classifier: ClassifierSettings,
    #[serde(default)]
    storage: StorageSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Pointbook configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub points: PointsSettings,
    pub queue: QueueSettings,
    pub classifier: ClassifierSettings,
    pub storage: StorageSettings,
    // Unknown top-level sections, written back untouched
    extra: HashMap<String, serde_json::Value>,
}

impl Config {
    /// Load config from the data directory
    ///
    /// A missing file yields defaults. A file that doesn't parse is an error,
    /// so a typo never silently resets the award amount. Environment
    /// overrides are applied last.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let mut config = Self {
            points: raw.points,
            queue: raw.queue,
            classifier: raw.classifier,
            storage: raw.storage,
            extra: raw.other,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_CLASSIFIER_URL) {
            if !url.trim().is_empty() {
                self.classifier.base_url = url.trim().to_string();
            }
        }
        if let Ok(delay) = std::env::var(ENV_ITEM_DELAY_MS) {
            match delay.trim().parse::<u64>() {
                Ok(ms) => self.queue.item_delay_ms = ms,
                Err(_) => tracing::warn!(value = %delay, "ignoring non-numeric {}", ENV_ITEM_DELAY_MS),
            }
        }
    }

    /// Save config to the data directory, keeping sections it doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings = SettingsFile {
            points: self.points.clone(),
            queue: self.queue.clone(),
            classifier: self.classifier.clone(),
            storage: self.storage.clone(),
            other: self.extra.clone(),
        };

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }

    /// Check values that serde can't
    pub fn validate(&self) -> Result<()> {
        if self.points.base_award <= 0 {
            anyhow::bail!("points.baseAward must be positive, got {}", self.points.base_award);
        }
        if self.points.duplicate_window_hours <= 0 {
            anyhow::bail!(
                "points.duplicateWindowHours must be positive, got {}",
                self.points.duplicate_window_hours
            );
        }
        let radius = self.points.geofence_radius_meters;
        if radius.is_nan() || radius <= 0.0 {
            anyhow::bail!(
                "points.geofenceRadiusMeters must be positive, got {}",
                self.points.geofence_radius_meters
            );
        }
        if self.classifier.timeout_secs == 0 {
            anyhow::bail!("classifier.timeoutSecs must be at least 1");
        }
        Ok(())
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.queue.item_delay_ms)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier.timeout_secs)
    }

    /// Resolved photo directory
    pub fn image_dir(&self, data_dir: &Path) -> PathBuf {
        self.storage
            .image_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("images"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.points.base_award, 5);
        assert_eq!(config.points.duplicate_window_hours, 24);
        assert_eq!(config.points.geofence_radius_meters, 500.0);
        assert_eq!(config.classifier.timeout_secs, 30);
        assert_eq!(config.image_dir(dir.path()), dir.path().join("images"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_and_unknown_fields_survive_save() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{
                "points": { "baseAward": 10, "bonusStreak": 3 },
                "ui": { "theme": "dark" }
            }"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        assert_eq!(config.points.base_award, 10);
        assert_eq!(config.points.duplicate_window_hours, 24);

        config.points.geofence_radius_meters = 250.0;
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved["ui"]["theme"], "dark");
        assert_eq!(saved["points"]["bonusStreak"], 3);
        assert_eq!(saved["points"]["geofenceRadiusMeters"], 250.0);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_award() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.points.base_award = 0;
        assert!(config.validate().is_err());
    }
}
