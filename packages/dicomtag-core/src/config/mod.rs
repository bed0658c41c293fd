//! Indexing configuration
//!
//! Defaults are usable as-is; a versioned YAML file may override any field.
//!
//! ```yaml
//! version: 1
//! max_allowed_tag_count: 128
//! reindex:
//!   batch_size: 100
//!   max_parallel_batches: 4
//!   max_retries: 3
//!   poll_interval_ms: 1000
//! ```

pub mod error;
pub mod io;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use error::{ConfigError, ConfigResult};
pub use validation::Validatable;

use io::ConfigExportV1;
use validation::check_range;

/// Top-level indexing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Ceiling on the number of extended query tags (1..=1024)
    pub max_allowed_tag_count: usize,

    pub reindex: ReindexConfig,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_allowed_tag_count: 128,
            reindex: ReindexConfig::default(),
        }
    }
}

/// Backfill job tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReindexConfig {
    /// Watermarks per batch (1..=10000)
    pub batch_size: usize,

    /// Batches in flight per job (1..=64)
    pub max_parallel_batches: usize,

    /// Infrastructure failures tolerated before a job fails (0..=20)
    pub max_retries: u32,

    /// Worker loop poll interval in milliseconds (10..=600000)
    pub poll_interval_ms: u64,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_parallel_batches: (num_cpus::get() * 3 / 4).clamp(1, 64),
            max_retries: 3,
            poll_interval_ms: 1000,
        }
    }
}

impl ReindexConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Validatable for ReindexConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "reindex.batch_size",
            self.batch_size,
            1,
            10_000,
            "Each batch must cover at least one watermark",
        )?;
        check_range(
            "reindex.max_parallel_batches",
            self.max_parallel_batches,
            1,
            64,
            "At least one batch must be allowed in flight",
        )?;
        check_range(
            "reindex.max_retries",
            self.max_retries,
            0,
            20,
            "Retries back off exponentially; keep the count small",
        )?;
        check_range(
            "reindex.poll_interval_ms",
            self.poll_interval_ms,
            10,
            600_000,
            "Poll interval must be between 10ms and 10 minutes",
        )
    }

    fn config_name(&self) -> &'static str {
        "ReindexConfig"
    }
}

impl Validatable for IndexingConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "max_allowed_tag_count",
            self.max_allowed_tag_count,
            1,
            1024,
            "Tag ceiling must allow at least one extended query tag",
        )?;
        self.reindex.validate()
    }

    fn config_name(&self) -> &'static str {
        "IndexingConfig"
    }
}

impl IndexingConfig {
    /// Load and validate a YAML v1 configuration file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let export: ConfigExportV1 = serde_yaml::from_str(&content)?;

        if export.version != 1 {
            return Err(ConfigError::UnsupportedVersion {
                found: export.version,
                supported: vec![1],
            });
        }

        let mut config = Self::default();
        if let Some(max) = export.max_allowed_tag_count {
            config.max_allowed_tag_count = max;
        }
        if let Some(reindex) = export.reindex {
            config.reindex = reindex;
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults when no path is given
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::from_yaml(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(&ConfigExportV1::from(self))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IndexingConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.reindex.max_parallel_batches >= 1);
        assert_eq!(config.reindex.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_tag_ceiling_range() {
        let config = IndexingConfig {
            max_allowed_tag_count: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_allowed_tag_count"));
    }

    #[test]
    fn test_retry_range() {
        let reindex = ReindexConfig {
            max_retries: 21,
            ..Default::default()
        };
        assert!(reindex.validate().is_err());
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        assert_eq!(IndexingConfig::load(None).unwrap(), IndexingConfig::default());
    }
}
