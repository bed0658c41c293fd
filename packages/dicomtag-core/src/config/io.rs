//! Configuration I/O (YAML loading)
//!
//! Defines the on-disk schema; conversion lives on [`IndexingConfig`].

use serde::{Deserialize, Serialize};

use super::{IndexingConfig, ReindexConfig};

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigExportV1 {
    /// Schema version (always 1 for v1)
    pub version: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_allowed_tag_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reindex: Option<ReindexConfig>,
}

impl From<&IndexingConfig> for ConfigExportV1 {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            version: 1,
            max_allowed_tag_count: Some(config.max_allowed_tag_count),
            reindex: Some(config.reindex.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::error::ConfigError;
    use crate::config::IndexingConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = IndexingConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("max_allowed_tag_count: 128"));
        assert!(yaml.contains("batch_size: 100"));
    }

    #[test]
    fn test_yaml_loading_with_partial_overrides() {
        let file = write_yaml(
            r#"
version: 1
max_allowed_tag_count: 5
reindex:
  batch_size: 250
"#,
        );

        let config = IndexingConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.max_allowed_tag_count, 5);
        assert_eq!(config.reindex.batch_size, 250);
        assert_eq!(config.reindex.max_retries, 3);
    }

    #[test]
    fn test_yaml_missing_version() {
        let file = write_yaml("max_allowed_tag_count: 5\n");
        assert!(matches!(
            IndexingConfig::from_yaml(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let file = write_yaml("version: 2\n");
        assert!(matches!(
            IndexingConfig::from_yaml(file.path()),
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let file = write_yaml("version: 1\nmax_tags: 5\n");
        assert!(matches!(
            IndexingConfig::from_yaml(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_yaml_out_of_range_rejected() {
        let file = write_yaml("version: 1\nreindex:\n  batch_size: 0\n");
        assert!(matches!(
            IndexingConfig::from_yaml(file.path()),
            Err(ConfigError::Range { .. })
        ));
    }
}
