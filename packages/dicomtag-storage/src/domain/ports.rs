//! Storage Ports (Trait Interfaces)
//!
//! Port/Adapter pattern for backend flexibility:
//! - Development / single node: SQLite (zero-config)
//! - Testing: InMemory (fast unit tests)

use async_trait::async_trait;
use dicomtag_core::{
    EntityKey, IndexDataType, IndexValue, InstanceRecord, QueryTagStatus, TagCatalogEntry,
    TagDefinition,
};
use uuid::Uuid;

use super::models::{ReindexJob, TagError, TagFilter};
use crate::Result;

/// Extended query tag catalog persistence
#[async_trait]
pub trait ExtendedQueryTagStore: Send + Sync {
    /// Insert all definitions with status Adding, atomically
    ///
    /// Fails `TagCountExceeded` when the resulting total would exceed
    /// `max_allowed`, and `DuplicateTag` when any (path, private creator)
    /// already exists. Concurrent callers serialize on both checks.
    async fn add_tags(&self, definitions: &[TagDefinition], max_allowed: usize) -> Result<Vec<i32>>;

    /// Entries matching the filter, ordered by key
    async fn get_tags(&self, filter: &TagFilter) -> Result<Vec<TagCatalogEntry>>;

    async fn get_tag(&self, key: i32) -> Result<Option<TagCatalogEntry>>;

    /// Compare-and-swap status update; `false` when the current status differs
    async fn compare_and_swap_status(
        &self,
        key: i32,
        expected: QueryTagStatus,
        next: QueryTagStatus,
    ) -> Result<bool>;

    /// Remove an entry that is already Deleting
    async fn remove_tag(&self, key: i32) -> Result<bool>;
}

/// Per-tag, per-entity failure ledger
#[async_trait]
pub trait TagErrorStore: Send + Sync {
    /// Insert or overwrite the row for (tag_key, watermark)
    async fn upsert_error(&self, error: &TagError) -> Result<()>;

    /// Errors for one tag ordered by created time, then watermark
    async fn get_errors(&self, tag_key: i32) -> Result<Vec<TagError>>;

    async fn delete_errors_for_tag(&self, tag_key: i32) -> Result<u64>;
}

/// Index rows, partitioned per data type and keyed by (tag_key, entity_key)
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Idempotent upsert; a row is only replaced by an equal or newer watermark
    async fn upsert(
        &self,
        tag_key: i32,
        entity_key: &EntityKey,
        watermark: i64,
        value: &IndexValue,
    ) -> Result<()>;

    async fn get_value(
        &self,
        tag_key: i32,
        data_type: IndexDataType,
        entity_key: &EntityKey,
    ) -> Result<Option<IndexValue>>;

    /// Rows across every partition for one tag
    async fn count_rows(&self, tag_key: i32) -> Result<u64>;

    async fn delete_rows_for_tag(&self, tag_key: i32) -> Result<u64>;
}

/// Read side of the host entity store
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Highest watermark currently stored, `None` when empty
    async fn max_watermark(&self) -> Result<Option<i64>>;

    /// Watermarks in `start..=end`, ascending
    async fn enumerate_watermarks(&self, start: i64, end: i64) -> Result<Vec<i64>>;

    async fn get_instance(&self, watermark: i64) -> Result<Option<InstanceRecord>>;
}

/// Durable reindex job records
#[async_trait]
pub trait ReindexJobStore: Send + Sync {
    /// Insert or replace by operation id
    async fn save_job(&self, job: &ReindexJob) -> Result<()>;

    async fn get_job(&self, operation_id: Uuid) -> Result<Option<ReindexJob>>;

    /// All jobs ordered by creation time
    async fn list_jobs(&self) -> Result<Vec<ReindexJob>>;
}
