//! Tag Catalog: registry of extended query tags and their lifecycle

use std::sync::Arc;

use dicomtag_core::{
    query::is_core_tag, validate_entries, AddTagEntry, DicomTag, QueryTag, QueryTagStatus,
    TagCatalogEntry,
};
use tracing::{info, warn};

use crate::domain::{ExtendedQueryTagStore, TagFilter};
use crate::error::{Result, StorageError};

#[derive(Clone)]
pub struct TagCatalog {
    store: Arc<dyn ExtendedQueryTagStore>,
}

impl TagCatalog {
    pub fn new(store: Arc<dyn ExtendedQueryTagStore>) -> Self {
        Self { store }
    }

    /// Validate, normalize and register new tags with status Adding
    pub async fn add_tags(&self, entries: &[AddTagEntry], max_allowed: usize) -> Result<Vec<i32>> {
        let definitions = validate_entries(entries)?;

        if let Some(core) = definitions
            .iter()
            .find(|definition| is_core_tag(&definition.tag))
        {
            return Err(StorageError::duplicate_tag(&core.path));
        }

        let keys = self.store.add_tags(&definitions, max_allowed).await?;
        info!(
            count = keys.len(),
            keys = ?keys,
            "Registered extended query tags"
        );
        Ok(keys)
    }

    pub async fn get_tags(&self, filter: &TagFilter) -> Result<Vec<TagCatalogEntry>> {
        self.store.get_tags(filter).await
    }

    pub async fn get_tag(&self, key: i32) -> Result<Option<TagCatalogEntry>> {
        self.store.get_tag(key).await
    }

    /// Non-deleted entry by path; a private creator narrows private tags
    pub async fn get_tag_by_path(
        &self,
        path: &str,
        private_creator: Option<&str>,
    ) -> Result<Option<TagCatalogEntry>> {
        let Some(tag) = DicomTag::parse_path(path.trim()) else {
            return Ok(None);
        };
        let path = tag.path();
        let entries = self.store.get_tags(&TagFilter::all()).await?;
        Ok(entries.into_iter().find(|entry| {
            entry.path == path
                && entry.status != QueryTagStatus::Deleting
                && private_creator.map_or(true, |creator| {
                    entry.private_creator.as_deref() == Some(creator)
                })
        }))
    }

    /// Compare-and-swap a status change
    ///
    /// A transition outside the lifecycle is a programming error and fails
    /// `InvalidTransition`; losing the race returns `Ok(false)`.
    pub async fn transition_status(
        &self,
        key: i32,
        expected: QueryTagStatus,
        next: QueryTagStatus,
    ) -> Result<bool> {
        if !expected.can_transition_to(next) {
            return Err(StorageError::invalid_transition(format!(
                "Tag {} cannot move from {} to {}",
                key, expected, next
            )));
        }

        let swapped = self.store.compare_and_swap_status(key, expected, next).await?;
        if swapped {
            info!(tag_key = key, from = %expected, to = %next, "Tag status changed");
        } else {
            warn!(tag_key = key, expected = %expected, next = %next, "Tag status changed concurrently");
        }
        Ok(swapped)
    }

    /// Tags new writes must be indexed against
    pub async fn indexed_tags(&self) -> Result<Vec<TagCatalogEntry>> {
        let entries = self.store.get_tags(&TagFilter::all()).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.status.is_indexed())
            .collect())
    }

    /// Ready tags as query tags
    pub async fn queryable_tags(&self) -> Result<Vec<QueryTag>> {
        let entries = self
            .store
            .get_tags(&TagFilter::with_status(QueryTagStatus::Ready))
            .await?;
        Ok(entries.iter().filter_map(QueryTag::from_entry).collect())
    }

    pub async fn remove_tag(&self, key: i32) -> Result<bool> {
        self.store.remove_tag(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infrastructure::InMemoryStore;
    use dicomtag_core::QueryTagLevel;

    fn catalog() -> TagCatalog {
        TagCatalog::new(Arc::new(InMemoryStore::new()))
    }

    fn entry(path: &str, vr: &str) -> AddTagEntry {
        AddTagEntry::new(path, vr, QueryTagLevel::Study)
    }

    #[tokio::test]
    async fn test_ceiling_scenario() {
        let catalog = catalog();
        let seed: Vec<_> = ["00101010", "00101020", "00101030", "00102160"]
            .iter()
            .map(|p| entry(p, "LO"))
            .collect();
        catalog.add_tags(&seed, 5).await.unwrap();

        let keys = catalog.add_tags(&[entry("00102180", "SH")], 5).await.unwrap();
        assert_eq!(keys.len(), 1);
        let added = catalog.get_tag(keys[0]).await.unwrap().unwrap();
        assert_eq!(added.status, QueryTagStatus::Adding);

        let err = catalog
            .add_tags(&[entry("001021B0", "LO")], 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TagCountExceeded);
    }

    #[tokio::test]
    async fn test_duplicate_and_core_tags_rejected() {
        let catalog = catalog();
        catalog.add_tags(&[entry("00101010", "AS")], 10).await.unwrap();

        let err = catalog
            .add_tags(&[entry("00101010", "AS")], 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateTag);

        let err = catalog
            .add_tags(&[entry("00100020", "LO")], 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateTag);
    }

    #[tokio::test]
    async fn test_transition_rules() {
        let catalog = catalog();
        let key = catalog.add_tags(&[entry("00101010", "AS")], 10).await.unwrap()[0];

        let err = catalog
            .transition_status(key, QueryTagStatus::Adding, QueryTagStatus::Ready)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidTransition);

        assert!(catalog
            .transition_status(key, QueryTagStatus::Adding, QueryTagStatus::Reindexing)
            .await
            .unwrap());
        // Stale expectation loses the compare-and-swap
        assert!(!catalog
            .transition_status(key, QueryTagStatus::Adding, QueryTagStatus::Reindexing)
            .await
            .unwrap());
        assert!(catalog
            .transition_status(key, QueryTagStatus::Reindexing, QueryTagStatus::Ready)
            .await
            .unwrap());
        assert_eq!(catalog.queryable_tags().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_tag_by_path_skips_deleting() {
        let catalog = catalog();
        let key = catalog.add_tags(&[entry("00101010", "AS")], 10).await.unwrap()[0];
        assert!(catalog.get_tag_by_path("00101010", None).await.unwrap().is_some());
        assert!(catalog.get_tag_by_path("0010101x", None).await.unwrap().is_none());

        catalog
            .transition_status(key, QueryTagStatus::Adding, QueryTagStatus::Deleting)
            .await
            .unwrap();
        assert!(catalog.get_tag_by_path("00101010", None).await.unwrap().is_none());
        assert!(catalog.indexed_tags().await.unwrap().is_empty());
    }
}
