//! In-Memory Store (for testing)
//!
//! Implements every storage port over plain maps behind one lock, so each
//! port call is atomic the same way a single SQLite statement is.

use async_trait::async_trait;
use dicomtag_core::{
    EntityKey, IndexDataType, IndexValue, InstanceRecord, QueryTagStatus, TagCatalogEntry,
    TagDefinition,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    EntityStore, ExtendedQueryTagStore, IndexStore, ReindexJob, ReindexJobStore, TagError,
    TagErrorStore, TagFilter,
};
use crate::error::{Result, StorageError};

#[derive(Debug, Clone)]
struct IndexRow {
    watermark: i64,
    value: IndexValue,
}

#[derive(Default)]
struct State {
    next_key: i32,
    tags: BTreeMap<i32, TagCatalogEntry>,
    errors: BTreeMap<(i32, i64), TagError>,
    index: HashMap<(i32, IndexDataType, EntityKey), IndexRow>,
    instances: BTreeMap<i64, InstanceRecord>,
    jobs: HashMap<Uuid, ReindexJob>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-side ingestion of an instance
    pub fn insert_instance(&self, record: InstanceRecord) {
        self.state.lock().instances.insert(record.watermark, record);
    }
}

#[async_trait]
impl ExtendedQueryTagStore for InMemoryStore {
    async fn add_tags(&self, definitions: &[TagDefinition], max_allowed: usize) -> Result<Vec<i32>> {
        let mut state = self.state.lock();

        let total = state.tags.len() + definitions.len();
        if total > max_allowed {
            return Err(StorageError::tag_count_exceeded(max_allowed, total));
        }

        for definition in definitions {
            let exists = state.tags.values().any(|entry| {
                entry.status != QueryTagStatus::Deleting
                    && entry.path == definition.path
                    && entry.private_creator == definition.private_creator
            });
            if exists {
                return Err(StorageError::duplicate_tag(&definition.path));
            }
        }

        let mut keys = Vec::with_capacity(definitions.len());
        for definition in definitions {
            state.next_key += 1;
            let key = state.next_key;
            state.tags.insert(
                key,
                TagCatalogEntry {
                    key,
                    path: definition.path.clone(),
                    vr: definition.vr,
                    private_creator: definition.private_creator.clone(),
                    level: definition.level,
                    status: QueryTagStatus::Adding,
                },
            );
            keys.push(key);
        }
        Ok(keys)
    }

    async fn get_tags(&self, filter: &TagFilter) -> Result<Vec<TagCatalogEntry>> {
        let state = self.state.lock();
        Ok(state
            .tags
            .values()
            .filter(|entry| filter.matches(entry.level, entry.status))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get_tag(&self, key: i32) -> Result<Option<TagCatalogEntry>> {
        Ok(self.state.lock().tags.get(&key).cloned())
    }

    async fn compare_and_swap_status(
        &self,
        key: i32,
        expected: QueryTagStatus,
        next: QueryTagStatus,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        match state.tags.get_mut(&key) {
            Some(entry) if entry.status == expected => {
                entry.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_tag(&self, key: i32) -> Result<bool> {
        let mut state = self.state.lock();
        match state.tags.get(&key) {
            Some(entry) if entry.status == QueryTagStatus::Deleting => {
                state.tags.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TagErrorStore for InMemoryStore {
    async fn upsert_error(&self, error: &TagError) -> Result<()> {
        self.state
            .lock()
            .errors
            .insert((error.tag_key, error.watermark), error.clone());
        Ok(())
    }

    async fn get_errors(&self, tag_key: i32) -> Result<Vec<TagError>> {
        let state = self.state.lock();
        let mut errors: Vec<_> = state
            .errors
            .range((tag_key, i64::MIN)..=(tag_key, i64::MAX))
            .map(|(_, error)| error.clone())
            .collect();
        errors.sort_by_key(|e| (e.created_time, e.watermark));
        Ok(errors)
    }

    async fn delete_errors_for_tag(&self, tag_key: i32) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.errors.len();
        state.errors.retain(|(key, _), _| *key != tag_key);
        Ok((before - state.errors.len()) as u64)
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn upsert(
        &self,
        tag_key: i32,
        entity_key: &EntityKey,
        watermark: i64,
        value: &IndexValue,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let key = (tag_key, value.data_type(), entity_key.clone());
        match state.index.get(&key) {
            Some(existing) if existing.watermark > watermark => {}
            _ => {
                state.index.insert(
                    key,
                    IndexRow {
                        watermark,
                        value: value.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_value(
        &self,
        tag_key: i32,
        data_type: IndexDataType,
        entity_key: &EntityKey,
    ) -> Result<Option<IndexValue>> {
        let state = self.state.lock();
        Ok(state
            .index
            .get(&(tag_key, data_type, entity_key.clone()))
            .map(|row| row.value.clone()))
    }

    async fn count_rows(&self, tag_key: i32) -> Result<u64> {
        let state = self.state.lock();
        Ok(state.index.keys().filter(|(key, _, _)| *key == tag_key).count() as u64)
    }

    async fn delete_rows_for_tag(&self, tag_key: i32) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.index.len();
        state.index.retain(|(key, _, _), _| *key != tag_key);
        Ok((before - state.index.len()) as u64)
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn max_watermark(&self) -> Result<Option<i64>> {
        Ok(self.state.lock().instances.keys().next_back().copied())
    }

    async fn enumerate_watermarks(&self, start: i64, end: i64) -> Result<Vec<i64>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .lock()
            .instances
            .range(start..=end)
            .map(|(watermark, _)| *watermark)
            .collect())
    }

    async fn get_instance(&self, watermark: i64) -> Result<Option<InstanceRecord>> {
        Ok(self.state.lock().instances.get(&watermark).cloned())
    }
}

#[async_trait]
impl ReindexJobStore for InMemoryStore {
    async fn save_job(&self, job: &ReindexJob) -> Result<()> {
        self.state.lock().jobs.insert(job.operation_id, job.clone());
        Ok(())
    }

    async fn get_job(&self, operation_id: Uuid) -> Result<Option<ReindexJob>> {
        Ok(self.state.lock().jobs.get(&operation_id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<ReindexJob>> {
        let mut jobs: Vec<_> = self.state.lock().jobs.values().cloned().collect();
        jobs.sort_by_key(|job| (job.created_at, job.operation_id));
        Ok(jobs)
    }
}
