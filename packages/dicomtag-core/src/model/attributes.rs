//! Raw attribute sets of stored entities and the keys index rows hang off

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::query_tag::QueryTagLevel;
use super::tag::{DicomTag, Vr};

/// One attribute of an entity as handed over by the upstream DICOM parser
///
/// Multi-valued attributes arrive already split on `\`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomAttribute {
    pub tag: DicomTag,
    pub vr: Vr,
    /// Creator string reserving the private block, if the parser captured one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_creator: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl DicomAttribute {
    pub fn new(tag: DicomTag, vr: Vr, value: impl Into<String>) -> Self {
        Self {
            tag,
            vr,
            private_creator: None,
            values: vec![value.into()],
        }
    }

    pub fn with_private_creator(mut self, creator: impl Into<String>) -> Self {
        self.private_creator = Some(creator.into());
        self
    }

    /// First value, the one that gets indexed
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// The attribute set of one entity, at most one attribute per tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DicomAttribute>", into = "Vec<DicomAttribute>")]
pub struct AttributeSet {
    attributes: BTreeMap<DicomTag, DicomAttribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any attribute with the same tag
    pub fn insert(&mut self, attribute: DicomAttribute) {
        self.attributes.insert(attribute.tag, attribute);
    }

    pub fn with(mut self, attribute: DicomAttribute) -> Self {
        self.insert(attribute);
        self
    }

    pub fn contains(&self, tag: &DicomTag) -> bool {
        self.attributes.contains_key(tag)
    }

    pub fn get(&self, tag: &DicomTag) -> Option<&DicomAttribute> {
        self.attributes.get(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DicomAttribute> {
        self.attributes.values()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<Vec<DicomAttribute>> for AttributeSet {
    fn from(attributes: Vec<DicomAttribute>) -> Self {
        let mut set = AttributeSet::new();
        for attribute in attributes {
            set.insert(attribute);
        }
        set
    }
}

impl From<AttributeSet> for Vec<DicomAttribute> {
    fn from(set: AttributeSet) -> Self {
        set.attributes.into_values().collect()
    }
}

impl FromIterator<DicomAttribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = DicomAttribute>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for attribute in iter {
            set.insert(attribute);
        }
        set
    }
}

/// Study / Series / SOP instance UIDs of a stored instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdentifier {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
}

impl InstanceIdentifier {
    pub fn new(
        study_instance_uid: impl Into<String>,
        series_instance_uid: impl Into<String>,
        sop_instance_uid: impl Into<String>,
    ) -> Self {
        Self {
            study_instance_uid: study_instance_uid.into(),
            series_instance_uid: series_instance_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
        }
    }
}

/// Key of an index row within a tag: the entity at the tag's level
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn for_level(level: QueryTagLevel, identifier: &InstanceIdentifier) -> Self {
        let key = match level {
            QueryTagLevel::Study => identifier.study_instance_uid.clone(),
            QueryTagLevel::Series => format!(
                "{}/{}",
                identifier.study_instance_uid, identifier.series_instance_uid
            ),
            QueryTagLevel::Instance => format!(
                "{}/{}/{}",
                identifier.study_instance_uid,
                identifier.series_instance_uid,
                identifier.sop_instance_uid
            ),
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntityKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored instance: its version watermark, identity, and attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub watermark: i64,
    pub identifier: InstanceIdentifier,
    pub attributes: AttributeSet,
}
