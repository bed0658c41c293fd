//! Add-tag request entries
//!
//! Entries arrive as loosely typed user input. [`validate_entries`] checks
//! every rule that does not need the catalog (syntax, VR support, private
//! creator pairing, in-request duplicates) and yields normalized
//! [`TagDefinition`]s ready for the catalog's count and uniqueness checks.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::{DicomTag, QueryTagLevel, Vr};
use crate::validation::{text::validate_lo, ElementValidationError};

/// First element number usable for private data (below are creator slots)
const PRIVATE_DATA_ELEMENT_MIN: u16 = 0x1000;

/// Raw add-tag request entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTagEntry {
    pub path: String,
    pub vr: String,
    #[serde(default)]
    pub private_creator: Option<String>,
    pub level: QueryTagLevel,
}

impl AddTagEntry {
    pub fn new(path: impl Into<String>, vr: impl Into<String>, level: QueryTagLevel) -> Self {
        Self {
            path: path.into(),
            vr: vr.into(),
            private_creator: None,
            level,
        }
    }

    pub fn with_private_creator(mut self, creator: impl Into<String>) -> Self {
        self.private_creator = Some(creator.into());
        self
    }

    /// Validate this entry in isolation and normalize it
    pub fn normalize(&self) -> Result<TagDefinition, TagEntryError> {
        let path = self.path.trim().to_ascii_uppercase();
        let tag = DicomTag::parse_path(&path).ok_or_else(|| TagEntryError::InvalidPath(self.path.clone()))?;

        let vr: Vr = self.vr.parse().map_err(|_| TagEntryError::InvalidVr {
            path: path.clone(),
            vr: self.vr.clone(),
        })?;
        if !vr.is_indexable() {
            return Err(TagEntryError::UnsupportedVr { path, vr });
        }

        if matches!(tag.group, 0x0000 | 0x0002) {
            return Err(TagEntryError::ReservedGroup(path));
        }

        let private_creator = self
            .private_creator
            .as_deref()
            .map(str::trim)
            .filter(|creator| !creator.is_empty());

        let private_creator = if tag.is_private() {
            if tag.element < PRIVATE_DATA_ELEMENT_MIN {
                return Err(TagEntryError::NotPrivateDataElement(path));
            }
            let creator = private_creator.ok_or_else(|| TagEntryError::MissingPrivateCreator(path.clone()))?;
            validate_lo(creator, "PrivateCreator").map_err(|source| {
                TagEntryError::InvalidPrivateCreator {
                    path: path.clone(),
                    source,
                }
            })?;
            Some(creator.to_string())
        } else {
            if private_creator.is_some() {
                return Err(TagEntryError::UnexpectedPrivateCreator(path));
            }
            None
        };

        Ok(TagDefinition {
            tag,
            path,
            vr,
            private_creator,
            level: self.level,
        })
    }
}

/// Normalized entry, the unit the catalog persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub tag: DicomTag,
    /// Upper case 8 hex digit path
    pub path: String,
    pub vr: Vr,
    pub private_creator: Option<String>,
    pub level: QueryTagLevel,
}

/// Rejected add-tag entry
#[derive(Debug, Error)]
pub enum TagEntryError {
    #[error("At least one tag must be supplied")]
    Empty,

    #[error("Tag path '{0}' is not 8 hexadecimal digits")]
    InvalidPath(String),

    #[error("Tag {path} has unknown value representation '{vr}'")]
    InvalidVr { path: String, vr: String },

    #[error("Tag {path} has value representation {vr}, which cannot be indexed")]
    UnsupportedVr { path: String, vr: Vr },

    #[error("Tag {0} belongs to a reserved group")]
    ReservedGroup(String),

    #[error("Private tag {0} is not a private data element")]
    NotPrivateDataElement(String),

    #[error("Private tag {0} requires a private creator")]
    MissingPrivateCreator(String),

    #[error("Standard tag {0} cannot have a private creator")]
    UnexpectedPrivateCreator(String),

    #[error("Private creator of tag {path} is invalid: {source}")]
    InvalidPrivateCreator {
        path: String,
        #[source]
        source: ElementValidationError,
    },

    #[error("Tag {0} is specified more than once")]
    DuplicateTag(String),
}

/// Validate a whole add-tag request
pub fn validate_entries(entries: &[AddTagEntry]) -> Result<Vec<TagDefinition>, TagEntryError> {
    if entries.is_empty() {
        return Err(TagEntryError::Empty);
    }

    let mut seen = HashSet::new();
    let mut definitions = Vec::with_capacity(entries.len());
    for entry in entries {
        let definition = entry.normalize()?;
        if !seen.insert((definition.path.clone(), definition.private_creator.clone())) {
            return Err(TagEntryError::DuplicateTag(definition.path));
        }
        definitions.push(definition);
    }
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_standard_tag() {
        let def = AddTagEntry::new("0008103e", "lo", QueryTagLevel::Series)
            .normalize()
            .unwrap();
        assert_eq!(def.path, "0008103E");
        assert_eq!(def.vr, Vr::LO);
        assert_eq!(def.private_creator, None);
    }

    #[test]
    fn test_private_tag_rules() {
        let ok = AddTagEntry::new("00091001", "CS", QueryTagLevel::Instance)
            .with_private_creator("ACME 1.0")
            .normalize()
            .unwrap();
        assert_eq!(ok.private_creator.as_deref(), Some("ACME 1.0"));

        let missing = AddTagEntry::new("00091001", "CS", QueryTagLevel::Instance).normalize();
        assert!(matches!(missing, Err(TagEntryError::MissingPrivateCreator(_))));

        let creator_slot = AddTagEntry::new("00090010", "LO", QueryTagLevel::Instance)
            .with_private_creator("ACME")
            .normalize();
        assert!(matches!(creator_slot, Err(TagEntryError::NotPrivateDataElement(_))));

        let bad_creator = AddTagEntry::new("00091001", "CS", QueryTagLevel::Instance)
            .with_private_creator("a\\b")
            .normalize();
        assert!(matches!(bad_creator, Err(TagEntryError::InvalidPrivateCreator { .. })));
    }

    #[test]
    fn test_standard_tag_rejects_creator() {
        let err = AddTagEntry::new("00100020", "LO", QueryTagLevel::Study)
            .with_private_creator("ACME")
            .normalize();
        assert!(matches!(err, Err(TagEntryError::UnexpectedPrivateCreator(_))));
    }

    #[test]
    fn test_vr_and_group_checks() {
        assert!(matches!(
            AddTagEntry::new("00100020", "XX", QueryTagLevel::Study).normalize(),
            Err(TagEntryError::InvalidVr { .. })
        ));
        assert!(matches!(
            AddTagEntry::new("00100020", "SQ", QueryTagLevel::Study).normalize(),
            Err(TagEntryError::UnsupportedVr { .. })
        ));
        assert!(matches!(
            AddTagEntry::new("00020010", "UI", QueryTagLevel::Study).normalize(),
            Err(TagEntryError::ReservedGroup(_))
        ));
        assert!(matches!(
            AddTagEntry::new("0010", "LO", QueryTagLevel::Study).normalize(),
            Err(TagEntryError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_validate_entries_duplicates_and_empty() {
        assert!(matches!(validate_entries(&[]), Err(TagEntryError::Empty)));

        let entries = vec![
            AddTagEntry::new("00100020", "LO", QueryTagLevel::Study),
            AddTagEntry::new("00100020", "LO", QueryTagLevel::Study),
        ];
        assert!(matches!(
            validate_entries(&entries),
            Err(TagEntryError::DuplicateTag(path)) if path == "00100020"
        ));
    }
}
