//! Reindex Orchestrator
//!
//! Drives persisted [`ReindexJob`]s: snapshot the end watermark, walk the
//! remaining range in ascending batches with bounded parallelism, persist the
//! cursor after every wave (up to `max_parallel_batches` batches), and flip
//! tags to Ready only once the whole range is behind the cursor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dicomtag_core::{QueryTag, QueryTagStatus, ReindexConfig};
use dicomtag_storage::{EntityStore, ReindexJob, ReindexJobStatus, ReindexJobStore, TagCatalog};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::checkpoint::{BatchCursor, BatchPlan};
use crate::error::{OrchestratorError, Result};
use crate::indexer::{EntityIndexer, IndexStats};
use crate::job::ReindexJobStateMachine;

/// Externally visible progress of one reindex operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub operation_id: Uuid,
    pub tag_keys: Vec<i32>,
    pub status: ReindexJobStatus,
    pub percent_complete: u8,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ReindexJob> for OperationStatus {
    fn from(job: &ReindexJob) -> Self {
        Self {
            operation_id: job.operation_id,
            tag_keys: job.tag_keys.clone(),
            status: job.status,
            percent_complete: job.percent_complete(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Contract the add-tag flow uses to schedule and observe backfills
#[async_trait]
pub trait OperationsClient: Send + Sync {
    /// Create (or resume) a job for `tag_keys` and run it in the background
    async fn start(&self, tag_keys: &[i32]) -> Result<Uuid>;

    /// Whether the operation reached a terminal state
    async fn is_completed(&self, operation_id: Uuid) -> Result<bool>;

    async fn get_status(&self, operation_id: Uuid) -> Result<OperationStatus>;

    /// Request cancellation, honoured at the next wave boundary
    ///
    /// A wave is up to `max_parallel_batches` batches; batches already in
    /// flight finish and are checkpointed first.
    async fn cancel(&self, operation_id: Uuid) -> Result<bool>;
}

#[derive(Clone)]
pub struct ReindexOrchestrator {
    catalog: TagCatalog,
    jobs: Arc<dyn ReindexJobStore>,
    entities: Arc<dyn EntityStore>,
    indexer: EntityIndexer,
    config: ReindexConfig,
    running: Arc<DashMap<Uuid, CancellationToken>>,
}

impl ReindexOrchestrator {
    pub fn new(
        catalog: TagCatalog,
        jobs: Arc<dyn ReindexJobStore>,
        entities: Arc<dyn EntityStore>,
        indexer: EntityIndexer,
        config: ReindexConfig,
    ) -> Self {
        Self {
            catalog,
            jobs,
            entities,
            indexer,
            config,
            running: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &ReindexConfig {
        &self.config
    }

    pub fn is_running(&self, operation_id: Uuid) -> bool {
        self.running.contains_key(&operation_id)
    }

    /// Persist a job for `tag_keys` without running it
    ///
    /// Adding tags move to Reindexing. A live job over the same tag set is
    /// returned as is; a failed or canceled one is continued from its
    /// snapshot and cursor.
    pub async fn create_job(&self, tag_keys: &[i32]) -> Result<ReindexJob> {
        let mut keys = tag_keys.to_vec();
        keys.sort_unstable();
        keys.dedup();
        if keys.is_empty() {
            return Err(OrchestratorError::TagNotFound("no tag keys given".to_string()));
        }

        for key in &keys {
            let entry = self
                .catalog
                .get_tag(*key)
                .await?
                .ok_or_else(|| OrchestratorError::TagNotFound(key.to_string()))?;
            match entry.status {
                QueryTagStatus::Deleting => {
                    return Err(OrchestratorError::TagNotReindexable {
                        key: *key,
                        status: entry.status.to_string(),
                    });
                }
                QueryTagStatus::Adding => {
                    self.catalog
                        .transition_status(*key, QueryTagStatus::Adding, QueryTagStatus::Reindexing)
                        .await?;
                }
                QueryTagStatus::Reindexing | QueryTagStatus::Ready => {}
            }
        }

        let previous = self
            .jobs
            .list_jobs()
            .await?
            .into_iter()
            .filter(|job| {
                let mut job_keys = job.tag_keys.clone();
                job_keys.sort_unstable();
                job_keys == keys
            })
            .last();

        let job = match previous {
            Some(live) if !live.status.is_terminal() => {
                debug!(operation_id = %live.operation_id, "Reusing live reindex job");
                return Ok(live);
            }
            Some(stopped)
                if matches!(
                    stopped.status,
                    ReindexJobStatus::Failed | ReindexJobStatus::Canceled
                ) =>
            {
                ReindexJob::resume_from(&stopped, keys)
            }
            _ => ReindexJob::new(keys),
        };

        self.jobs.save_job(&job).await?;
        info!(
            operation_id = %job.operation_id,
            tag_keys = ?job.tag_keys,
            resumed_from = ?job.resumed_from,
            "Reindex job created"
        );
        Ok(job)
    }

    /// Run a job in a background task; false if it is already running here
    pub fn spawn(&self, operation_id: Uuid) -> bool {
        let token = match self.running.entry(operation_id) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => slot.insert(CancellationToken::new()).clone(),
        };

        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.execute(operation_id, &token).await;
            this.running.remove(&operation_id);
            match outcome {
                Ok(status) => debug!(operation_id = %operation_id, status = %status, "Reindex task finished"),
                Err(e) => error!(operation_id = %operation_id, error = %e, "Reindex task failed"),
            }
        });
        true
    }

    /// Run a job to its next resting point on the current task
    ///
    /// Returns the resulting status: Completed, Canceled, Failed, or Running
    /// when suspended by an infrastructure failure.
    pub async fn run(&self, operation_id: Uuid) -> Result<ReindexJobStatus> {
        let token = match self.running.entry(operation_id) {
            Entry::Occupied(_) => return Err(OrchestratorError::AlreadyRunning(operation_id)),
            Entry::Vacant(slot) => slot.insert(CancellationToken::new()).clone(),
        };
        let outcome = self.execute(operation_id, &token).await;
        self.running.remove(&operation_id);
        outcome
    }

    async fn execute(&self, operation_id: Uuid, token: &CancellationToken) -> Result<ReindexJobStatus> {
        let job = self
            .jobs
            .get_job(operation_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound(operation_id))?;
        if job.status.is_terminal() {
            return Ok(job.status);
        }

        let mut machine = ReindexJobStateMachine::new(job);
        machine.start()?;
        info!(
            operation_id = %operation_id,
            tag_keys = ?machine.job().tag_keys,
            attempt = machine.job().attempt,
            cursor = machine.job().next_watermark,
            "Reindex job started"
        );

        match self.drive(&mut machine, token).await {
            Ok(()) => Ok(machine.job().status),
            // The final save failed; the persisted job is still Running and
            // the next run repeats only the idempotent tail
            Err(e) if machine.job().status.is_terminal() => Err(e),
            Err(e) if e.is_transient() => {
                let status = machine.suspend(e.to_string(), self.config.max_retries)?;
                if status == ReindexJobStatus::Failed {
                    error!(
                        operation_id = %operation_id,
                        attempt = machine.job().attempt,
                        error = %e,
                        "Reindex job failed after retries"
                    );
                } else {
                    warn!(
                        operation_id = %operation_id,
                        attempt = machine.job().attempt,
                        cursor = machine.job().next_watermark,
                        not_before = ?machine.job().not_before,
                        error = %e,
                        "Reindex job suspended"
                    );
                }
                self.jobs.save_job(machine.job()).await?;
                Ok(status)
            }
            Err(e) => {
                error!(
                    operation_id = %operation_id,
                    category = %e.category(),
                    error = %e,
                    "Reindex job failed"
                );
                machine.fail(e.to_string())?;
                self.jobs.save_job(machine.job()).await?;
                Err(e)
            }
        }
    }

    /// Cancellation and tag deletions are observed between waves only
    async fn drive(&self, machine: &mut ReindexJobStateMachine, token: &CancellationToken) -> Result<()> {
        let operation_id = machine.job().operation_id;

        let Some(mut tags) = self.refresh_tags(machine).await? else {
            return Ok(());
        };

        if !machine.job().end_watermark_resolved {
            let end = self.entities.max_watermark().await?;
            machine.snapshot_end(end);
            info!(operation_id = %operation_id, end_watermark = ?end, "Backfill range fixed");
        }
        self.jobs.save_job(machine.job()).await?;

        let plan = BatchPlan::new(
            machine.job().next_watermark,
            machine.job().end_watermark,
            self.config.batch_size,
        );
        let parallel = self.config.max_parallel_batches.max(1);
        let mut cursor = BatchCursor::new(machine.job().next_watermark);
        let mut totals = IndexStats::default();

        for (wave_index, wave) in plan.batches().chunks(parallel).enumerate() {
            if token.is_cancelled() {
                machine.cancel("Canceled by request")?;
                self.jobs.save_job(machine.job()).await?;
                info!(
                    operation_id = %operation_id,
                    cursor = cursor.position(),
                    "Reindex job canceled"
                );
                return Ok(());
            }

            if wave_index > 0 {
                match self.refresh_tags(machine).await? {
                    Some(current) => tags = current,
                    None => return Ok(()),
                }
            }

            let results: Vec<Result<IndexStats>> = stream::iter(wave.iter().copied())
                .map(|batch| {
                    let indexer = &self.indexer;
                    let tags = &tags;
                    async move { indexer.index_batch(batch, tags).await }
                })
                .buffered(parallel)
                .collect()
                .await;

            let mut failure = None;
            for (batch, result) in wave.iter().zip(results) {
                match result {
                    Ok(stats) => {
                        machine.advance(cursor.complete(*batch)?)?;
                        totals += stats;
                    }
                    Err(e) => {
                        warn!(operation_id = %operation_id, batch = %batch, error = %e, "Batch failed");
                        failure = Some(e);
                        break;
                    }
                }
            }

            self.jobs.save_job(machine.job()).await?;
            if let Some(e) = failure {
                return Err(e);
            }
            debug!(
                operation_id = %operation_id,
                cursor = cursor.position(),
                percent = machine.job().percent_complete(),
                "Wave completed"
            );
        }

        // Pick up deletions that raced with the last wave
        if !plan.is_empty() {
            tags = match self.refresh_tags(machine).await? {
                Some(current) => current,
                None => return Ok(()),
            };
        }
        debug!(operation_id = %operation_id, tags = tags.len(), "Backfill range drained");

        // Barrier: nothing below runs unless the whole range is behind the cursor
        machine.ensure_drained()?;
        for key in machine.job().tag_keys.clone() {
            let current = self.catalog.get_tag(key).await?;
            if current.map(|entry| entry.status) == Some(QueryTagStatus::Reindexing) {
                self.catalog
                    .transition_status(key, QueryTagStatus::Reindexing, QueryTagStatus::Ready)
                    .await?;
            }
        }
        machine.complete()?;
        self.jobs.save_job(machine.job()).await?;

        info!(
            operation_id = %operation_id,
            entities = totals.entities,
            indexed = totals.indexed,
            errors = totals.errors,
            "Reindex job completed"
        );
        Ok(())
    }

    /// Current query tags of the job, dropping deleted ones
    ///
    /// Cancels the job and returns `None` when no tag is left. Adding tags
    /// are moved to Reindexing.
    async fn refresh_tags(&self, machine: &mut ReindexJobStateMachine) -> Result<Option<Vec<QueryTag>>> {
        let mut tags = Vec::with_capacity(machine.job().tag_keys.len());
        let mut live = Vec::with_capacity(machine.job().tag_keys.len());

        for key in machine.job().tag_keys.clone() {
            let Some(entry) = self.catalog.get_tag(key).await? else {
                continue;
            };
            if entry.status == QueryTagStatus::Deleting {
                continue;
            }
            if entry.status == QueryTagStatus::Adding {
                self.catalog
                    .transition_status(key, QueryTagStatus::Adding, QueryTagStatus::Reindexing)
                    .await?;
            }
            if let Some(tag) = QueryTag::from_entry(&entry) {
                tags.push(tag);
                live.push(key);
            }
        }

        let dropped = machine.retain_tags(|key| live.contains(&key));
        if !dropped.is_empty() {
            info!(
                operation_id = %machine.job().operation_id,
                dropped = ?dropped,
                "Dropped deleted tags from reindex job"
            );
            for key in &dropped {
                self.indexer.discard(*key).await?;
            }
        }

        if tags.is_empty() {
            machine.cancel("All tags of the job were deleted")?;
            self.jobs.save_job(machine.job()).await?;
            info!(operation_id = %machine.job().operation_id, "Reindex job canceled: no tags left");
            return Ok(None);
        }
        Ok(Some(tags))
    }

    async fn load(&self, operation_id: Uuid) -> Result<ReindexJob> {
        self.jobs
            .get_job(operation_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound(operation_id))
    }
}

#[async_trait]
impl OperationsClient for ReindexOrchestrator {
    async fn start(&self, tag_keys: &[i32]) -> Result<Uuid> {
        let job = self.create_job(tag_keys).await?;
        self.spawn(job.operation_id);
        Ok(job.operation_id)
    }

    async fn is_completed(&self, operation_id: Uuid) -> Result<bool> {
        Ok(self.load(operation_id).await?.status.is_terminal())
    }

    async fn get_status(&self, operation_id: Uuid) -> Result<OperationStatus> {
        Ok(OperationStatus::from(&self.load(operation_id).await?))
    }

    async fn cancel(&self, operation_id: Uuid) -> Result<bool> {
        let token = self.running.get(&operation_id).map(|entry| entry.value().clone());
        if let Some(token) = token {
            token.cancel();
            info!(operation_id = %operation_id, "Cancellation requested");
            return Ok(true);
        }

        // Not running in this process: settle the persisted record directly
        let job = self.load(operation_id).await?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        let mut machine = ReindexJobStateMachine::new(job);
        machine.cancel("Canceled by request")?;
        self.jobs.save_job(machine.job()).await?;
        info!(operation_id = %operation_id, "Reindex job canceled");
        Ok(true)
    }
}
