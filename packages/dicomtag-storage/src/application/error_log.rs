//! Tag Error Log: per-tag, per-entity failure ledger

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dicomtag_core::{DicomTag, QueryTagStatus, ValidationErrorCode};
use tracing::debug;

use crate::domain::{ExtendedQueryTagStore, TagError, TagErrorStore, TagFilter};
use crate::error::{Result, StorageError};

#[derive(Clone)]
pub struct TagErrorLog {
    errors: Arc<dyn TagErrorStore>,
    tags: Arc<dyn ExtendedQueryTagStore>,
}

impl TagErrorLog {
    pub fn new(errors: Arc<dyn TagErrorStore>, tags: Arc<dyn ExtendedQueryTagStore>) -> Self {
        Self { errors, tags }
    }

    /// Upsert on (tag_key, watermark); re-recording overwrites in place
    pub async fn record_error(
        &self,
        tag_key: i32,
        error_code: ValidationErrorCode,
        watermark: i64,
        created_time: DateTime<Utc>,
    ) -> Result<()> {
        let error = TagError {
            tag_key,
            watermark,
            error_code,
            created_time,
        };
        self.errors.upsert_error(&error).await?;
        debug!(tag_key, watermark, code = error_code.code(), "Recorded tag error");
        Ok(())
    }

    /// Errors for the non-deleted tag at `path`, oldest first
    pub async fn get_errors(&self, path: &str) -> Result<Vec<TagError>> {
        let tag = DicomTag::parse_path(path.trim()).ok_or_else(|| StorageError::tag_not_found(path))?;
        let normalized = tag.path();

        let entries = self.tags.get_tags(&TagFilter::all()).await?;
        let entry = entries
            .iter()
            .find(|entry| entry.path == normalized && entry.status != QueryTagStatus::Deleting)
            .ok_or_else(|| StorageError::tag_not_found(path))?;

        self.errors.get_errors(entry.key).await
    }

    pub async fn purge(&self, tag_key: i32) -> Result<u64> {
        self.errors.delete_errors_for_tag(tag_key).await
    }
}
