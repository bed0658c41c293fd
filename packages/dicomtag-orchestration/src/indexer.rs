//! Entity indexing shared by backfill batches and inline writes

use std::collections::HashSet;
use std::ops::AddAssign;
use std::sync::Arc;

use chrono::Utc;
use dicomtag_core::{resolve, validate_value, EntityKey, InstanceRecord, QueryTag};
use dicomtag_storage::{EntityStore, IndexStore, TagCatalog, TagErrorLog};
use tracing::{debug, warn};

use crate::checkpoint::WatermarkRange;
use crate::error::Result;

/// What indexing one or more entities did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub entities: u64,
    /// Index rows upserted
    pub indexed: u64,
    /// Values rejected by a validator and sent to the error log
    pub errors: u64,
}

impl AddAssign for IndexStats {
    fn add_assign(&mut self, other: Self) {
        self.entities += other.entities;
        self.indexed += other.indexed;
        self.errors += other.errors;
    }
}

#[derive(Clone)]
pub struct EntityIndexer {
    catalog: TagCatalog,
    entities: Arc<dyn EntityStore>,
    index: Arc<dyn IndexStore>,
    error_log: TagErrorLog,
}

impl EntityIndexer {
    pub fn new(
        catalog: TagCatalog,
        entities: Arc<dyn EntityStore>,
        index: Arc<dyn IndexStore>,
        error_log: TagErrorLog,
    ) -> Self {
        Self {
            catalog,
            entities,
            index,
            error_log,
        }
    }

    /// Index one entity against `tags`
    ///
    /// A tag the entity does not carry, or an empty value, yields nothing. A
    /// malformed value goes to the error log and never fails the call; index
    /// store failures do.
    pub async fn index_entity(&self, record: &InstanceRecord, tags: &[QueryTag]) -> Result<IndexStats> {
        let mut stats = IndexStats {
            entities: 1,
            ..IndexStats::default()
        };

        for (tag, attribute) in resolve(&record.attributes, tags) {
            let Some(tag_key) = tag.extended_key() else {
                continue;
            };
            let Some(raw) = attribute.first_value() else {
                continue;
            };

            match validate_value(tag.vr, raw, &tag.name()) {
                Ok(Some(value)) => {
                    let entity_key = EntityKey::for_level(tag.level, &record.identifier);
                    self.index
                        .upsert(tag_key, &entity_key, record.watermark, &value)
                        .await?;
                    stats.indexed += 1;
                }
                Ok(None) => {}
                Err(invalid) => {
                    stats.errors += 1;
                    debug!(
                        tag_key,
                        watermark = record.watermark,
                        error = %invalid,
                        "Value rejected"
                    );
                    if let Err(e) = self
                        .error_log
                        .record_error(tag_key, invalid.code, record.watermark, Utc::now())
                        .await
                    {
                        warn!(
                            tag_key,
                            watermark = record.watermark,
                            error = %e,
                            "Failed to record tag error; continuing"
                        );
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Index every entity of one batch
    pub async fn index_batch(&self, batch: WatermarkRange, tags: &[QueryTag]) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        for watermark in self.entities.enumerate_watermarks(batch.start, batch.end).await? {
            // Removed between enumeration and load
            let Some(record) = self.entities.get_instance(watermark).await? else {
                continue;
            };
            stats += self.index_entity(&record, tags).await?;
        }
        debug!(
            batch = %batch,
            entities = stats.entities,
            indexed = stats.indexed,
            errors = stats.errors,
            "Batch indexed"
        );
        Ok(stats)
    }

    /// Drop rows and errors a batch wrote for a tag deleted meanwhile
    pub async fn discard(&self, tag_key: i32) -> Result<()> {
        let rows = self.index.delete_rows_for_tag(tag_key).await?;
        let errors = self.error_log.purge(tag_key).await?;
        if rows > 0 || errors > 0 {
            debug!(tag_key, rows, errors, "Discarded late writes for deleted tag");
        }
        Ok(())
    }

    /// Inline indexing of a newly written instance against every live tag
    ///
    /// A tag deleted between the catalog read and the write would keep the
    /// row forever, so the catalog is read again afterwards and writes for
    /// tags that left it are discarded.
    pub async fn index_instance(&self, record: &InstanceRecord) -> Result<IndexStats> {
        let tags: Vec<QueryTag> = self
            .catalog
            .indexed_tags()
            .await?
            .iter()
            .filter_map(QueryTag::from_entry)
            .collect();
        if tags.is_empty() {
            return Ok(IndexStats {
                entities: 1,
                ..IndexStats::default()
            });
        }

        let stats = self.index_entity(record, &tags).await?;
        if stats.indexed + stats.errors == 0 {
            return Ok(stats);
        }

        let live: HashSet<i32> = self
            .catalog
            .indexed_tags()
            .await?
            .iter()
            .map(|entry| entry.key)
            .collect();
        for key in tags.iter().filter_map(QueryTag::extended_key) {
            if !live.contains(&key) {
                self.discard(key).await?;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicomtag_core::{
        AddTagEntry, AttributeSet, DicomAttribute, DicomTag, IndexDataType, IndexValue,
        InstanceIdentifier, QueryTagLevel, QueryTagStatus, ValidationErrorCode, Vr,
    };
    use async_trait::async_trait;
    use dicomtag_storage::{ExtendedQueryTagStore, InMemoryStore, TagErrorStore};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    const AGE: DicomTag = DicomTag::new(0x0010, 0x1010);
    const WEIGHT: DicomTag = DicomTag::new(0x0010, 0x1030);

    struct Fixture {
        store: Arc<InMemoryStore>,
        catalog: TagCatalog,
        indexer: EntityIndexer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let catalog = TagCatalog::new(store.clone());
        let error_log = TagErrorLog::new(store.clone(), store.clone());
        let indexer = EntityIndexer::new(catalog.clone(), store.clone(), store.clone(), error_log);
        Fixture {
            store,
            catalog,
            indexer,
        }
    }

    fn record(watermark: i64, attributes: AttributeSet) -> InstanceRecord {
        InstanceRecord {
            watermark,
            identifier: InstanceIdentifier::new("1.2", "1.2.3", format!("1.2.3.{}", watermark)),
            attributes,
        }
    }

    async fn register(fx: &Fixture) -> (i32, i32) {
        let keys = fx
            .catalog
            .add_tags(
                &[
                    AddTagEntry::new("00101010", "AS", QueryTagLevel::Study),
                    AddTagEntry::new("00101030", "DS", QueryTagLevel::Instance),
                ],
                10,
            )
            .await
            .unwrap();
        (keys[0], keys[1])
    }

    #[tokio::test]
    async fn test_inline_indexing_covers_adding_tags() {
        let fx = fixture();
        let (age, weight) = register(&fx).await;

        let entity = record(
            7,
            AttributeSet::new()
                .with(DicomAttribute::new(AGE, Vr::AS, "042Y"))
                .with(DicomAttribute::new(WEIGHT, Vr::DS, "71.5")),
        );
        let stats = fx.indexer.index_instance(&entity).await.unwrap();
        assert_eq!(stats.indexed, 2);

        let study = EntityKey::for_level(QueryTagLevel::Study, &entity.identifier);
        assert_eq!(
            fx.store.get_value(age, IndexDataType::String, &study).await.unwrap(),
            Some(IndexValue::String("042Y".into()))
        );
        let instance = EntityKey::for_level(QueryTagLevel::Instance, &entity.identifier);
        assert_eq!(
            fx.store.get_value(weight, IndexDataType::Double, &instance).await.unwrap(),
            Some(IndexValue::Double(71.5))
        );
    }

    #[tokio::test]
    async fn test_invalid_value_is_logged_not_indexed() {
        let fx = fixture();
        let (age, _) = register(&fx).await;

        let entity = record(3, AttributeSet::new().with(DicomAttribute::new(AGE, Vr::AS, "42 years")));
        let stats = fx.indexer.index_instance(&entity).await.unwrap();
        assert_eq!(stats, IndexStats { entities: 1, indexed: 0, errors: 1 });

        assert_eq!(fx.store.count_rows(age).await.unwrap(), 0);
        let errors = fx.store.get_errors(age).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].watermark, 3);
        assert_ne!(errors[0].error_code, ValidationErrorCode::UnsupportedVr);
    }

    #[tokio::test]
    async fn test_missing_and_empty_values_are_absent() {
        let fx = fixture();
        let (age, weight) = register(&fx).await;

        let entity = record(4, AttributeSet::new().with(DicomAttribute::new(AGE, Vr::AS, "")));
        let stats = fx.indexer.index_instance(&entity).await.unwrap();
        assert_eq!(stats, IndexStats { entities: 1, indexed: 0, errors: 0 });
        assert_eq!(fx.store.count_rows(age).await.unwrap(), 0);
        assert!(fx.store.get_errors(weight).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_tags_are_not_indexed_inline() {
        let fx = fixture();
        let (age, _) = register(&fx).await;
        fx.catalog
            .transition_status(age, QueryTagStatus::Adding, QueryTagStatus::Deleting)
            .await
            .unwrap();

        let entity = record(5, AttributeSet::new().with(DicomAttribute::new(AGE, Vr::AS, "042Y")));
        fx.indexer.index_instance(&entity).await.unwrap();
        assert_eq!(fx.store.count_rows(age).await.unwrap(), 0);
    }

    /// Completes a tag delete right before the first write lands
    struct DeleteBeforeFirstWrite {
        inner: Arc<InMemoryStore>,
        catalog: TagCatalog,
        armed: AtomicBool,
    }

    #[async_trait]
    impl IndexStore for DeleteBeforeFirstWrite {
        async fn upsert(
            &self,
            tag_key: i32,
            entity_key: &EntityKey,
            watermark: i64,
            value: &IndexValue,
        ) -> dicomtag_storage::Result<()> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.catalog
                    .transition_status(tag_key, QueryTagStatus::Adding, QueryTagStatus::Deleting)
                    .await?;
                self.inner.delete_rows_for_tag(tag_key).await?;
                self.catalog.remove_tag(tag_key).await?;
            }
            self.inner.upsert(tag_key, entity_key, watermark, value).await
        }

        async fn get_value(
            &self,
            tag_key: i32,
            data_type: IndexDataType,
            entity_key: &EntityKey,
        ) -> dicomtag_storage::Result<Option<IndexValue>> {
            self.inner.get_value(tag_key, data_type, entity_key).await
        }

        async fn count_rows(&self, tag_key: i32) -> dicomtag_storage::Result<u64> {
            self.inner.count_rows(tag_key).await
        }

        async fn delete_rows_for_tag(&self, tag_key: i32) -> dicomtag_storage::Result<u64> {
            self.inner.delete_rows_for_tag(tag_key).await
        }
    }

    #[tokio::test]
    async fn test_inline_write_racing_delete_leaves_no_rows() {
        let store = Arc::new(InMemoryStore::new());
        let catalog = TagCatalog::new(store.clone());
        let age = catalog
            .add_tags(&[AddTagEntry::new("00101010", "AS", QueryTagLevel::Study)], 10)
            .await
            .unwrap()[0];
        let index = Arc::new(DeleteBeforeFirstWrite {
            inner: store.clone(),
            catalog: catalog.clone(),
            armed: AtomicBool::new(true),
        });
        let error_log = TagErrorLog::new(store.clone(), store.clone());
        let indexer = EntityIndexer::new(catalog, store.clone(), index, error_log);

        let entity = record(9, AttributeSet::new().with(DicomAttribute::new(AGE, Vr::AS, "042Y")));
        let stats = indexer.index_instance(&entity).await.unwrap();
        assert_eq!(stats.indexed, 1);

        assert!(store.get_tag(age).await.unwrap().is_none());
        assert_eq!(store.count_rows(age).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_index_batch_reads_only_its_range() {
        let fx = fixture();
        let (age, _) = register(&fx).await;
        for watermark in 1..=6 {
            fx.store.insert_instance(record(
                watermark,
                AttributeSet::new().with(DicomAttribute::new(AGE, Vr::AS, "030Y")),
            ));
        }
        let tags: Vec<QueryTag> = fx
            .catalog
            .indexed_tags()
            .await
            .unwrap()
            .iter()
            .filter_map(QueryTag::from_entry)
            .collect();

        let stats = fx
            .indexer
            .index_batch(WatermarkRange::new(2, 4), &tags)
            .await
            .unwrap();
        assert_eq!(stats.entities, 3);
        // Study-level rows collapse onto one study
        assert_eq!(fx.store.count_rows(age).await.unwrap(), 1);
    }
}
