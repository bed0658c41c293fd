//! Add and delete flows for extended query tags

use std::sync::Arc;

use dicomtag_core::{AddTagEntry, IndexingConfig, QueryTagStatus, TagCatalogEntry};
use dicomtag_storage::{IndexStore, TagCatalog, TagErrorLog, TagFilter};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::orchestrator::OperationsClient;

/// Tags registered by one add request and the backfill scheduled for them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTagsResponse {
    pub tag_keys: Vec<i32>,
    pub operation_id: Uuid,
}

/// Register tags, then schedule their backfill
pub struct AddTagService {
    catalog: TagCatalog,
    operations: Arc<dyn OperationsClient>,
    config: IndexingConfig,
}

impl AddTagService {
    pub fn new(catalog: TagCatalog, operations: Arc<dyn OperationsClient>, config: IndexingConfig) -> Self {
        Self {
            catalog,
            operations,
            config,
        }
    }

    /// Ceiling and duplicate failures surface here synchronously; nothing is
    /// queued for them. If scheduling fails the tags are left without a job
    /// and the worker schedules them on its next pass.
    pub async fn add(&self, entries: &[AddTagEntry]) -> Result<AddTagsResponse> {
        let tag_keys = self
            .catalog
            .add_tags(entries, self.config.max_allowed_tag_count)
            .await?;

        let operation_id = self.operations.start(&tag_keys).await?;
        info!(
            tag_keys = ?tag_keys,
            operation_id = %operation_id,
            "Backfill scheduled for new tags"
        );
        Ok(AddTagsResponse {
            tag_keys,
            operation_id,
        })
    }
}

/// Move a tag to Deleting, purge its rows, then drop the catalog entry
#[derive(Clone)]
pub struct DeleteTagService {
    catalog: TagCatalog,
    error_log: TagErrorLog,
    index: Arc<dyn IndexStore>,
}

/// Concurrent status changes tolerated before giving up on a delete
const DELETE_CAS_ATTEMPTS: usize = 3;

impl DeleteTagService {
    pub fn new(catalog: TagCatalog, error_log: TagErrorLog, index: Arc<dyn IndexStore>) -> Self {
        Self {
            catalog,
            error_log,
            index,
        }
    }

    pub async fn delete(&self, path: &str, private_creator: Option<&str>) -> Result<()> {
        for _ in 0..DELETE_CAS_ATTEMPTS {
            let entry = self
                .catalog
                .get_tag_by_path(path, private_creator)
                .await?
                .ok_or_else(|| OrchestratorError::TagNotFound(path.to_string()))?;

            if self
                .catalog
                .transition_status(entry.key, entry.status, QueryTagStatus::Deleting)
                .await?
            {
                return self.purge(&entry).await;
            }
        }

        Err(OrchestratorError::InvalidStateTransition {
            from: "concurrently changing".to_string(),
            to: QueryTagStatus::Deleting.to_string(),
        })
    }

    /// Finish deletes interrupted after the Deleting transition
    pub async fn purge_deleting(&self) -> Result<usize> {
        let pending = self
            .catalog
            .get_tags(&TagFilter::with_status(QueryTagStatus::Deleting))
            .await?;
        for entry in &pending {
            self.purge(entry).await?;
        }
        Ok(pending.len())
    }

    async fn purge(&self, entry: &TagCatalogEntry) -> Result<()> {
        let rows = self.index.delete_rows_for_tag(entry.key).await?;
        let errors = self.error_log.purge(entry.key).await?;
        if !self.catalog.remove_tag(entry.key).await? {
            warn!(tag_key = entry.key, "Catalog entry already removed");
        }
        info!(
            tag_key = entry.key,
            path = %entry.path,
            rows,
            errors,
            "Extended query tag deleted"
        );
        Ok(())
    }
}
