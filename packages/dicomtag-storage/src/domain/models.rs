//! Persisted records owned by the storage layer

use chrono::{DateTime, Utc};
use dicomtag_core::{QueryTagLevel, QueryTagStatus, ValidationErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One per-entity indexing failure, unique per (tag_key, watermark)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagError {
    pub tag_key: i32,
    pub watermark: i64,
    pub error_code: ValidationErrorCode,
    pub created_time: DateTime<Utc>,
}

impl TagError {
    pub fn new(tag_key: i32, watermark: i64, error_code: ValidationErrorCode) -> Self {
        Self {
            tag_key,
            watermark,
            error_code,
            created_time: Utc::now(),
        }
    }
}

/// Catalog listing filter; entries are always ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub level: Option<QueryTagLevel>,
    pub status: Option<QueryTagStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl TagFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: QueryTagStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: QueryTagLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, level: QueryTagLevel, status: QueryTagStatus) -> bool {
        self.level.map_or(true, |l| l == level) && self.status.map_or(true, |s| s == status)
    }
}

/// Reindex job lifecycle
///
/// ```text
/// NotStarted ──► Running ──► Completed
///      │            │
///      └────────────┴──► Failed | Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReindexJobStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl ReindexJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexJobStatus::NotStarted => "not_started",
            ReindexJobStatus::Running => "running",
            ReindexJobStatus::Completed => "completed",
            ReindexJobStatus::Failed => "failed",
            ReindexJobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReindexJobStatus::Completed | ReindexJobStatus::Failed | ReindexJobStatus::Canceled
        )
    }
}

impl fmt::Display for ReindexJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReindexJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ReindexJobStatus::NotStarted),
            "running" => Ok(ReindexJobStatus::Running),
            "completed" => Ok(ReindexJobStatus::Completed),
            "failed" => Ok(ReindexJobStatus::Failed),
            "canceled" => Ok(ReindexJobStatus::Canceled),
            _ => Err(format!("Invalid reindex job status: {}", s)),
        }
    }
}

/// Persisted backfill job: the unit of durability for reindexing
///
/// `end_watermark` is fixed when the job first runs. `next_watermark` is the
/// resume cursor: every entity below it has been indexed or had its failure
/// logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexJob {
    pub operation_id: Uuid,
    pub tag_keys: Vec<i32>,
    /// Highest entity watermark at job start. Only meaningful once
    /// `end_watermark_resolved` is set; `None` then means no entities existed.
    pub end_watermark: Option<i64>,
    pub end_watermark_resolved: bool,
    pub next_watermark: i64,
    pub status: ReindexJobStatus,
    /// Consecutive infrastructure failures
    pub attempt: u32,
    pub error: Option<String>,
    /// Failed or canceled job this one continues
    pub resumed_from: Option<Uuid>,
    /// Earliest time the worker may pick the job up again
    pub not_before: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReindexJob {
    pub fn new(tag_keys: Vec<i32>) -> Self {
        let now = Utc::now();
        Self {
            operation_id: Uuid::new_v4(),
            tag_keys,
            end_watermark: None,
            end_watermark_resolved: false,
            next_watermark: 0,
            status: ReindexJobStatus::NotStarted,
            attempt: 0,
            error: None,
            resumed_from: None,
            not_before: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Continue a failed or canceled job with its snapshot and cursor
    pub fn resume_from(previous: &ReindexJob, tag_keys: Vec<i32>) -> Self {
        let mut job = Self::new(tag_keys);
        job.end_watermark = previous.end_watermark;
        job.end_watermark_resolved = previous.end_watermark_resolved;
        job.next_watermark = previous.next_watermark;
        job.resumed_from = Some(previous.operation_id);
        job
    }

    /// Percentage of the watermark range behind the cursor
    pub fn percent_complete(&self) -> u8 {
        if self.status == ReindexJobStatus::Completed {
            return 100;
        }
        match (self.end_watermark_resolved, self.end_watermark) {
            (true, None) => 100,
            (true, Some(end)) if end >= 0 => {
                let total = end.saturating_add(1);
                let done = self.next_watermark.clamp(0, total) as f64;
                ((done / total as f64) * 100.0).floor() as u8
            }
            _ => 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.not_before.map_or(true, |t| t <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            ReindexJobStatus::NotStarted,
            ReindexJobStatus::Running,
            ReindexJobStatus::Completed,
            ReindexJobStatus::Failed,
            ReindexJobStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<ReindexJobStatus>(), Ok(status));
        }
        assert!(ReindexJobStatus::Canceled.is_terminal());
        assert!(!ReindexJobStatus::Running.is_terminal());
    }

    #[test]
    fn test_percent_complete() {
        let mut job = ReindexJob::new(vec![1]);
        assert_eq!(job.percent_complete(), 0);

        job.end_watermark_resolved = true;
        job.end_watermark = Some(999);
        job.next_watermark = 500;
        assert_eq!(job.percent_complete(), 50);

        job.next_watermark = 1000;
        assert_eq!(job.percent_complete(), 100);

        let mut empty = ReindexJob::new(vec![1]);
        empty.end_watermark_resolved = true;
        assert_eq!(empty.percent_complete(), 100);
    }

    #[test]
    fn test_percent_complete_at_watermark_ceiling() {
        let mut job = ReindexJob::new(vec![1]);
        job.end_watermark_resolved = true;
        job.end_watermark = Some(i64::MAX);
        assert_eq!(job.percent_complete(), 0);
        job.next_watermark = i64::MAX;
        assert_eq!(job.percent_complete(), 100);
    }

    #[test]
    fn test_resume_inherits_snapshot_and_cursor() {
        let mut failed = ReindexJob::new(vec![1, 2]);
        failed.end_watermark = Some(10_000);
        failed.end_watermark_resolved = true;
        failed.next_watermark = 4_200;
        failed.status = ReindexJobStatus::Failed;

        let resumed = ReindexJob::resume_from(&failed, vec![1]);
        assert_ne!(resumed.operation_id, failed.operation_id);
        assert_eq!(resumed.end_watermark, Some(10_000));
        assert_eq!(resumed.next_watermark, 4_200);
        assert_eq!(resumed.resumed_from, Some(failed.operation_id));
        assert_eq!(resumed.status, ReindexJobStatus::NotStarted);
    }

    #[test]
    fn test_is_due_respects_backoff() {
        let now = Utc::now();
        let mut job = ReindexJob::new(vec![1]);
        assert!(job.is_due(now));
        job.not_before = Some(now + chrono::Duration::seconds(4));
        assert!(!job.is_due(now));
        job.status = ReindexJobStatus::Completed;
        job.not_before = None;
        assert!(!job.is_due(now));
    }

    #[test]
    fn test_tag_filter_matches() {
        let filter = TagFilter::with_status(QueryTagStatus::Ready).with_level(QueryTagLevel::Study);
        assert!(filter.matches(QueryTagLevel::Study, QueryTagStatus::Ready));
        assert!(!filter.matches(QueryTagLevel::Series, QueryTagStatus::Ready));
        assert!(TagFilter::all().matches(QueryTagLevel::Instance, QueryTagStatus::Adding));
    }
}
