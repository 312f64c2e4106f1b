//! Engine configuration.
//!
//! Every knob has a default, so a JSON file only needs the keys it wants to
//! change:
//!
//! ```json
//! { "cache_capacity": 64, "sampling": { "sample_rate": 0.05 } }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes of page header preceding the slot area.
pub const PAGE_HEADER_SIZE: usize = 8;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Storage and cache parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Size of every on-disk page in bytes.
    pub page_size: usize,
    /// Maximum number of resident pages in the page cache.
    pub cache_capacity: usize,
    pub sampling: SamplingConfig,
}

/// Parameters of the progressive loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Estimated row count at which loads switch from sequential to sampled.
    pub threshold_rows: u64,
    /// Fraction of the estimated row count loaded per incremental call.
    pub sample_rate: f64,
    /// Incremental loads stop once the ledger is within this many rows of
    /// the estimate.
    pub ledger_slack: u64,
    /// Consecutive already-consumed draws tolerated before a random-sample
    /// call gives up.
    pub max_resample_attempts: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            cache_capacity: 100,
            sampling: SamplingConfig::default(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            threshold_rows: 1000,
            sample_rate: 0.01,
            ledger_slack: 100,
            max_resample_attempts: 10_000,
        }
    }
}

impl StorageConfig {
    /// Parses a configuration from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values describe a usable engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size <= PAGE_HEADER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size {} must exceed the {}-byte header",
                self.page_size, PAGE_HEADER_SIZE
            )));
        }
        if i32::try_from(self.page_size).is_err() {
            return Err(ConfigError::Invalid(format!(
                "page_size {} does not fit the page header",
                self.page_size
            )));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be > 0".into()));
        }
        self.sampling.validate()
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate {} must be in (0, 1]",
                self.sample_rate
            )));
        }
        if self.max_resample_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_resample_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StorageConfig::default();
        config.validate().unwrap();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.sampling.threshold_rows, 1000);
        assert_eq!(config.sampling.ledger_slack, 100);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            StorageConfig::from_json_str(r#"{"cache_capacity": 8, "sampling": {"sample_rate": 0.5}}"#)
                .unwrap();
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.sampling.sample_rate, 0.5);
        assert_eq!(config.sampling.threshold_rows, 1000);
    }

    #[test]
    fn test_rejects_tiny_page() {
        let err = StorageConfig::from_json_str(r#"{"page_size": 8}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_rate() {
        let err = StorageConfig::from_json_str(r#"{"sampling": {"sample_rate": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"page_size": 512}"#).unwrap();

        let config = StorageConfig::from_json_file(&path).unwrap();
        assert_eq!(config.page_size, 512);
    }
}
