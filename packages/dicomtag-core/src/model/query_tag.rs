//! Extended query tag catalog entries and the queryable tag view

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::tag::{DicomTag, Vr};

/// Entity level a tag is indexed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QueryTagLevel {
    Study,
    Series,
    Instance,
}

impl QueryTagLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryTagLevel::Study => "study",
            QueryTagLevel::Series => "series",
            QueryTagLevel::Instance => "instance",
        }
    }
}

impl fmt::Display for QueryTagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryTagLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "study" => Ok(QueryTagLevel::Study),
            "series" => Ok(QueryTagLevel::Series),
            "instance" => Ok(QueryTagLevel::Instance),
            _ => Err(format!("Invalid query tag level: {}", s)),
        }
    }
}

/// Lifecycle status of an extended query tag
///
/// Transitions only move forward:
///
/// ```text
/// Adding ──► Reindexing ──► Ready
///    │            │            │
///    └────────────┴────────────┴──► Deleting ──► (removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryTagStatus {
    Adding,
    Reindexing,
    Ready,
    Deleting,
}

impl QueryTagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryTagStatus::Adding => "adding",
            QueryTagStatus::Reindexing => "reindexing",
            QueryTagStatus::Ready => "ready",
            QueryTagStatus::Deleting => "deleting",
        }
    }

    /// Whether `self -> next` is one of the permitted forward transitions
    pub fn can_transition_to(&self, next: QueryTagStatus) -> bool {
        use QueryTagStatus::*;
        matches!(
            (self, next),
            (Adding, Reindexing)
                | (Reindexing, Ready)
                | (Adding, Deleting)
                | (Reindexing, Deleting)
                | (Ready, Deleting)
        )
    }

    /// Tags in these states receive index values for new writes
    pub fn is_indexed(&self) -> bool {
        !matches!(self, QueryTagStatus::Deleting)
    }

    /// Tags in these states still need (or are under) backfill
    pub fn needs_backfill(&self) -> bool {
        matches!(self, QueryTagStatus::Adding | QueryTagStatus::Reindexing)
    }
}

impl fmt::Display for QueryTagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryTagStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adding" => Ok(QueryTagStatus::Adding),
            "reindexing" => Ok(QueryTagStatus::Reindexing),
            "ready" => Ok(QueryTagStatus::Ready),
            "deleting" => Ok(QueryTagStatus::Deleting),
            _ => Err(format!("Invalid query tag status: {}", s)),
        }
    }
}

/// Extended query tag as persisted in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCatalogEntry {
    /// Store-allocated key, immutable once assigned
    pub key: i32,
    /// 8 hex digit path, upper case
    pub path: String,
    pub vr: Vr,
    /// Only set for private tags
    pub private_creator: Option<String>,
    pub level: QueryTagLevel,
    pub status: QueryTagStatus,
}

impl TagCatalogEntry {
    pub fn tag(&self) -> Option<DicomTag> {
        DicomTag::parse_path(&self.path)
    }
}

impl fmt::Display for TagCatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Key: {}, Path: {}, VR: {}, Level: {}, Status: {}",
            self.key, self.path, self.vr, self.level, self.status
        )
    }
}

/// Where a query tag comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryTagSource {
    /// Always-indexed attribute of the host store
    Core { keyword: String },
    /// Admin-registered extended query tag
    Extended { key: i32, status: QueryTagStatus },
}

/// Read-only view binding a tag to its attribute identity and display name
///
/// Used both as the index tag handed to the resolver and as the target of a
/// parsed filter condition. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryTag {
    pub tag: DicomTag,
    pub vr: Vr,
    pub private_creator: Option<String>,
    pub level: QueryTagLevel,
    pub source: QueryTagSource,
    range_queryable: bool,
}

impl QueryTag {
    /// Core tag; range matching must be opted into per tag
    pub fn core(
        keyword: impl Into<String>,
        tag: DicomTag,
        vr: Vr,
        level: QueryTagLevel,
        range_queryable: bool,
    ) -> Self {
        Self {
            tag,
            vr,
            private_creator: None,
            level,
            source: QueryTagSource::Core {
                keyword: keyword.into(),
            },
            range_queryable,
        }
    }

    /// View over a catalog entry. Temporal extended tags accept range literals.
    ///
    /// Returns `None` if the entry's path is not a valid tag path.
    pub fn from_entry(entry: &TagCatalogEntry) -> Option<Self> {
        let tag = entry.tag()?;
        Some(Self {
            tag,
            vr: entry.vr,
            private_creator: entry.private_creator.clone(),
            level: entry.level,
            source: QueryTagSource::Extended {
                key: entry.key,
                status: entry.status,
            },
            range_queryable: matches!(entry.vr, Vr::DA | Vr::DT | Vr::TM),
        })
    }

    pub fn is_range_queryable(&self) -> bool {
        self.range_queryable
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.source, QueryTagSource::Extended { .. })
    }

    pub fn extended_key(&self) -> Option<i32> {
        match self.source {
            QueryTagSource::Extended { key, .. } => Some(key),
            QueryTagSource::Core { .. } => None,
        }
    }

    /// Status of the backing catalog entry; core tags are always queryable
    pub fn status(&self) -> QueryTagStatus {
        match self.source {
            QueryTagSource::Extended { status, .. } => status,
            QueryTagSource::Core { .. } => QueryTagStatus::Ready,
        }
    }

    pub fn path(&self) -> String {
        self.tag.path()
    }

    /// Display name used in error messages: keyword for core tags, path otherwise
    pub fn name(&self) -> String {
        match &self.source {
            QueryTagSource::Core { keyword } => keyword.clone(),
            QueryTagSource::Extended { .. } => self.tag.path(),
        }
    }
}

impl fmt::Display for QueryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vr: Vr, status: QueryTagStatus) -> TagCatalogEntry {
        TagCatalogEntry {
            key: 7,
            path: "00101010".to_string(),
            vr,
            private_creator: None,
            level: QueryTagLevel::Study,
            status,
        }
    }

    #[test]
    fn test_forward_transitions_only() {
        use QueryTagStatus::*;
        assert!(Adding.can_transition_to(Reindexing));
        assert!(Reindexing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Deleting));
        assert!(Adding.can_transition_to(Deleting));

        assert!(!Ready.can_transition_to(Reindexing));
        assert!(!Reindexing.can_transition_to(Adding));
        assert!(!Adding.can_transition_to(Ready));
        assert!(!Deleting.can_transition_to(Ready));
        assert!(!Deleting.can_transition_to(Deleting));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            QueryTagStatus::Adding,
            QueryTagStatus::Reindexing,
            QueryTagStatus::Ready,
            QueryTagStatus::Deleting,
        ] {
            assert_eq!(status.as_str().parse::<QueryTagStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_query_tag_from_entry_range_flag() {
        let date = QueryTag::from_entry(&entry(Vr::DA, QueryTagStatus::Ready)).unwrap();
        assert!(date.is_range_queryable());
        assert_eq!(date.extended_key(), Some(7));
        assert_eq!(date.name(), "00101010");

        let text = QueryTag::from_entry(&entry(Vr::LO, QueryTagStatus::Ready)).unwrap();
        assert!(!text.is_range_queryable());
    }

    #[test]
    fn test_query_tag_from_entry_rejects_bad_path() {
        let mut bad = entry(Vr::LO, QueryTagStatus::Ready);
        bad.path = "nothex!!".to_string();
        assert!(QueryTag::from_entry(&bad).is_none());
    }

    #[test]
    fn test_core_tag_is_always_ready() {
        let tag = QueryTag::core(
            "StudyDate",
            DicomTag::new(0x0008, 0x0020),
            Vr::DA,
            QueryTagLevel::Study,
            true,
        );
        assert_eq!(tag.status(), QueryTagStatus::Ready);
        assert_eq!(tag.name(), "StudyDate");
        assert!(!tag.is_extended());
    }
}
