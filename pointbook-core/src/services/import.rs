//! Import service - CSV bulk submissions into a queue run

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{ItemStatus, QueueRunState, SubmissionPayload};

/// Header names to use for each field; `None` means auto-detect
#[derive(Debug, Clone, Default)]
pub struct ColumnMappings {
    pub account_id: Option<String>,
    pub product_id: Option<String>,
    pub store_id: Option<String>,
    pub price: Option<String>,
    pub photo: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub discount_period: Option<String>,
}

/// Import options for CSV processing
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub mappings: ColumnMappings,
    /// Account used for rows without an account column or value
    pub default_account_id: Option<String>,
    /// Prices are written in major units with cents ("12.99" becomes 1299)
    pub decimal_prices: bool,
}

/// Columns found by header matching
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectedColumns {
    pub account_id: Option<String>,
    pub product_id: Option<String>,
    pub store_id: Option<String>,
    pub price: Option<String>,
    pub photo: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub discount_period: Option<String>,
}

/// A CSV row that could not become a submission
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    /// 1-based line in the file, header included
    pub line: u64,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    #[serde(skip)]
    pub state: QueueRunState,
    /// Data rows read from the CSV
    pub discovered: i64,
    /// Rows queued for processing
    pub queued: i64,
    /// Rows repeated within the file, queued as Skipped
    pub skipped: i64,
    pub rejected: Vec<RejectedRow>,
}

/// Import service for CSV submission batches
///
/// Import never touches the database; it only builds a run. Verification and
/// awards happen when the run goes through the submission queue.
#[derive(Debug, Default)]
pub struct ImportService;

struct ColumnIndices {
    account_id: Option<usize>,
    product_id: usize,
    store_id: usize,
    price: usize,
    photo: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    discount_period: Option<usize>,
}

impl ImportService {
    pub fn new() -> Self {
        Self
    }

    /// Read a CSV into a run ready for [`crate::services::SubmissionQueue::run`]
    ///
    /// Relative photo paths resolve against the CSV's directory.
    pub fn import(&self, file_path: &Path, options: &ImportOptions) -> Result<ImportResult> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(file_path)
            .with_context(|| format!("Failed to read CSV file {}", file_path.display()))?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let detected = detect_from_headers(&headers);
        let columns = resolve_columns(&headers, &options.mappings, &detected)?;

        if columns.account_id.is_none() && options.default_account_id.is_none() {
            anyhow::bail!("CSV has no account column; pass a default account");
        }

        let base_dir = file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut payloads = Vec::new();
        let mut rejected = Vec::new();
        let mut discovered = 0i64;

        for (row, record) in reader.records().enumerate() {
            let line = row as u64 + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    rejected.push(RejectedRow {
                        line,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            discovered += 1;

            match build_payload(&record, &columns, options, &base_dir) {
                Ok(payload) => payloads.push(payload),
                Err(error) => rejected.push(RejectedRow { line, error }),
            }
        }

        let state = QueueRunState::new(payloads);
        let skipped = state
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Skipped)
            .count() as i64;
        let queued = state.len() as i64 - skipped;

        tracing::info!(
            file = %file_path.display(),
            discovered,
            queued,
            skipped,
            rejected = rejected.len(),
            "csv import parsed"
        );

        Ok(ImportResult {
            state,
            discovered,
            queued,
            skipped,
            rejected,
        })
    }

    /// Auto-detect column mappings from the CSV header
    pub fn detect_columns(&self, file_path: &Path) -> Result<DetectedColumns> {
        let mut reader = csv::Reader::from_path(file_path).context("Failed to read CSV file")?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        Ok(detect_from_headers(&headers))
    }
}

fn detect_from_headers(headers: &[String]) -> DetectedColumns {
    let account_patterns = ["account", "user", "reporter", "member"];
    let product_patterns = ["product", "barcode", "item", "sku", "ean", "upc"];
    let store_patterns = ["store", "shop", "branch", "market"];
    let price_patterns = ["price", "amount", "cost"];
    let photo_patterns = ["photo", "image", "picture", "file"];
    let latitude_patterns = ["latitude", "lat"];
    let longitude_patterns = ["longitude", "lng", "lon"];
    let discount_patterns = ["discount", "promo", "sale period"];

    // Discount columns often contain "price" too, so they are claimed first
    let discount_period = find_header(headers, &discount_patterns, &[]);
    let taken: Vec<&str> = discount_period.iter().map(String::as_str).collect();

    DetectedColumns {
        account_id: find_header(headers, &account_patterns, &taken),
        product_id: find_header(headers, &product_patterns, &taken),
        store_id: find_header(headers, &store_patterns, &taken),
        price: find_header(headers, &price_patterns, &taken),
        photo: find_header(headers, &photo_patterns, &taken),
        latitude: find_header(headers, &latitude_patterns, &taken),
        longitude: find_header(headers, &longitude_patterns, &taken),
        discount_period,
    }
}

fn find_header(headers: &[String], patterns: &[&str], taken: &[&str]) -> Option<String> {
    headers
        .iter()
        .filter(|h| !taken.contains(&h.as_str()))
        .find(|h| {
            let lower = h.to_lowercase();
            patterns.iter().any(|p| lower.contains(p))
        })
        .cloned()
}

fn resolve_columns(
    headers: &[String],
    mappings: &ColumnMappings,
    detected: &DetectedColumns,
) -> Result<ColumnIndices> {
    let position = |explicit: &Option<String>, fallback: &Option<String>| -> Result<Option<usize>> {
        match explicit {
            Some(name) => headers
                .iter()
                .position(|h| h == name)
                .map(Some)
                .with_context(|| format!("Column '{}' not found", name)),
            None => Ok(fallback
                .as_ref()
                .and_then(|name| headers.iter().position(|h| h == name))),
        }
    };
    let required = |explicit: &Option<String>, fallback: &Option<String>, field: &str| -> Result<usize> {
        position(explicit, fallback)?
            .with_context(|| format!("Could not find a {} column in the CSV header", field))
    };

    Ok(ColumnIndices {
        account_id: position(&mappings.account_id, &detected.account_id)?,
        product_id: required(&mappings.product_id, &detected.product_id, "product")?,
        store_id: required(&mappings.store_id, &detected.store_id, "store")?,
        price: required(&mappings.price, &detected.price, "price")?,
        photo: position(&mappings.photo, &detected.photo)?,
        latitude: position(&mappings.latitude, &detected.latitude)?,
        longitude: position(&mappings.longitude, &detected.longitude)?,
        discount_period: position(&mappings.discount_period, &detected.discount_period)?,
    })
}

fn build_payload(
    record: &csv::StringRecord,
    columns: &ColumnIndices,
    options: &ImportOptions,
    base_dir: &Path,
) -> std::result::Result<SubmissionPayload, String> {
    let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).filter(|s| !s.is_empty());

    let account_id = field(columns.account_id)
        .map(str::to_string)
        .or_else(|| options.default_account_id.clone())
        .ok_or_else(|| "missing account id".to_string())?;
    let product_id = field(Some(columns.product_id)).ok_or("missing product id")?;
    let store_id = field(Some(columns.store_id)).ok_or("missing store id")?;
    let raw_price = field(Some(columns.price)).ok_or("missing price")?;
    let price = parse_price(raw_price, options.decimal_prices)
        .ok_or_else(|| format!("unreadable price '{}'", raw_price))?;

    let mut payload = SubmissionPayload::new(account_id, product_id, store_id, price);

    if let Some(photo) = field(columns.photo) {
        let path = PathBuf::from(photo);
        payload.photo_path = Some(if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        });
    }

    payload.latitude = parse_coordinate(field(columns.latitude), "latitude")?;
    payload.longitude = parse_coordinate(field(columns.longitude), "longitude")?;
    payload.discount_period = field(columns.discount_period).map(str::to_string);

    payload.validate()?;
    Ok(payload)
}

fn parse_coordinate(raw: Option<&str>, name: &str) -> std::result::Result<Option<f64>, String> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("unreadable {} '{}'", name, s)),
    }
}

/// Parse a price into minor units
///
/// Currency symbols, spaces and thousands separators are dropped. Without
/// `decimal_prices` the value must be whole ("9,990" is 9990); with it the
/// value is scaled by 100 and may carry at most two decimals.
fn parse_price(s: &str, decimal_prices: bool) -> Option<i64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: Decimal = cleaned.parse().ok()?;
    let minor = if decimal_prices {
        value.checked_mul(Decimal::ONE_HUNDRED)?
    } else {
        value
    };

    if minor.fract() != Decimal::ZERO || minor <= Decimal::ZERO {
        return None;
    }
    minor.to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_csv(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("batch.csv");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("9,990", false), Some(9990));
        assert_eq!(parse_price("₩ 9,990", false), Some(9990));
        assert_eq!(parse_price("12.99", true), Some(1299));
        assert_eq!(parse_price("$3", true), Some(300));
        assert_eq!(parse_price("12.99", false), None);
        assert_eq!(parse_price("1.999", true), None);
        assert_eq!(parse_price("0", false), None);
        assert_eq!(parse_price("-5", false), None);
        assert_eq!(parse_price("n/a", false), None);
        // Overflowing the scale or i64 rejects the row
        assert_eq!(parse_price("79228162514264337593543950335", true), None);
        assert_eq!(parse_price("79228162514264337593543950335", false), None);
    }

    #[test]
    fn test_detect_columns() {
        let headers: Vec<String> = [
            "User",
            "Barcode",
            "Store ID",
            "Discount price period",
            "Price",
            "Photo",
            "Lat",
            "Lng",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let detected = detect_from_headers(&headers);
        assert_eq!(detected.account_id.as_deref(), Some("User"));
        assert_eq!(detected.product_id.as_deref(), Some("Barcode"));
        assert_eq!(detected.store_id.as_deref(), Some("Store ID"));
        assert_eq!(detected.price.as_deref(), Some("Price"));
        assert_eq!(detected.discount_period.as_deref(), Some("Discount price period"));
        assert_eq!(detected.latitude.as_deref(), Some("Lat"));
        assert_eq!(detected.longitude.as_deref(), Some("Lng"));
    }

    #[test]
    fn test_import_builds_run() {
        let dir = tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "account_id,product_id,store_id,price,photo,latitude,longitude\n\
             user-1,1234567,S1,\"9,990\",tags/a.jpg,37.5665,126.9780\n\
             user-1,1234567,S1,9990,,,\n\
             user-2,7654321,S1,abc,,,\n\
             ,,,,,,\n\
             user-2,7654321,S2,1500,/abs/b.jpg,,\n",
        );

        let result = ImportService::new().import(&path, &ImportOptions::default()).unwrap();
        assert_eq!(result.discovered, 4);
        assert_eq!(result.queued, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].line, 4);
        assert!(result.rejected[0].error.contains("abc"));

        let first = &result.state.items[0].payload;
        assert_eq!(first.price, 9990);
        assert_eq!(first.photo_path.as_deref(), Some(dir.path().join("tags/a.jpg").as_path()));
        assert_eq!(first.latitude, Some(37.5665));
        assert_eq!(
            result.state.items[2].payload.photo_path.as_deref(),
            Some(Path::new("/abs/b.jpg"))
        );
    }

    #[test]
    fn test_default_account_fills_missing_column() {
        let dir = tempdir().unwrap();
        let path = write_csv(dir.path(), "barcode,store,price\n1234567,S1,9990\n");

        assert!(ImportService::new().import(&path, &ImportOptions::default()).is_err());

        let options = ImportOptions {
            default_account_id: Some("user-9".to_string()),
            ..ImportOptions::default()
        };
        let result = ImportService::new().import(&path, &options).unwrap();
        assert_eq!(result.state.items[0].payload.account_id, "user-9");
    }

    #[test]
    fn test_explicit_mapping_must_exist() {
        let dir = tempdir().unwrap();
        let path = write_csv(dir.path(), "account,product,store,price\nu,1,S1,10\n");
        let options = ImportOptions {
            mappings: ColumnMappings {
                price: Some("cost".to_string()),
                ..ColumnMappings::default()
            },
            ..ImportOptions::default()
        };
        let err = ImportService::new().import(&path, &options).unwrap_err();
        assert!(err.to_string().contains("cost"));
    }
}
