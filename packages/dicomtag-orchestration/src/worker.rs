//! Restartable worker loop
//!
//! All progress lives in the job store, so a worker can stop at any point
//! and a fresh one continues where it left off: it resumes live jobs whose
//! backoff elapsed, schedules tags no job has ever covered, and finishes
//! deletes that were interrupted.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dicomtag_storage::{ReindexJobStatus, ReindexJobStore, TagCatalog, TagFilter};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::orchestrator::ReindexOrchestrator;
use crate::service::DeleteTagService;

/// Work found by one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerPass {
    /// Interrupted deletes that were finished
    pub purged: usize,
    /// Jobs due to run, in creation order
    pub due: Vec<Uuid>,
}

#[derive(Clone)]
pub struct ReindexWorker {
    orchestrator: ReindexOrchestrator,
    catalog: TagCatalog,
    jobs: Arc<dyn ReindexJobStore>,
    deleter: DeleteTagService,
}

impl ReindexWorker {
    pub fn new(
        orchestrator: ReindexOrchestrator,
        catalog: TagCatalog,
        jobs: Arc<dyn ReindexJobStore>,
        deleter: DeleteTagService,
    ) -> Self {
        Self {
            orchestrator,
            catalog,
            jobs,
            deleter,
        }
    }

    /// Collect due work
    ///
    /// Tags covered by a failed or canceled job are left alone; restarting
    /// them is an explicit `start`.
    pub async fn poll(&self) -> Result<WorkerPass> {
        let purged = self.deleter.purge_deleting().await?;

        let now = Utc::now();
        let jobs = self.jobs.list_jobs().await?;
        let covered: HashSet<i32> = jobs
            .iter()
            .flat_map(|job| job.tag_keys.iter().copied())
            .collect();

        let mut due: Vec<Uuid> = jobs
            .iter()
            .filter(|job| job.is_due(now) && !self.orchestrator.is_running(job.operation_id))
            .map(|job| job.operation_id)
            .collect();

        let unscheduled: Vec<i32> = self
            .catalog
            .get_tags(&TagFilter::all())
            .await?
            .into_iter()
            .filter(|entry| entry.status.needs_backfill() && !covered.contains(&entry.key))
            .map(|entry| entry.key)
            .collect();
        if !unscheduled.is_empty() {
            let job = self.orchestrator.create_job(&unscheduled).await?;
            info!(
                operation_id = %job.operation_id,
                tag_keys = ?job.tag_keys,
                "Scheduled backfill for unscheduled tags"
            );
            if !due.contains(&job.operation_id) {
                due.push(job.operation_id);
            }
        }

        Ok(WorkerPass { purged, due })
    }

    /// One pass, running due jobs to their next resting point
    pub async fn run_once(&self) -> Result<Vec<(Uuid, ReindexJobStatus)>> {
        let pass = self.poll().await?;
        let runs = pass.due.iter().map(|operation_id| async move {
            (*operation_id, self.orchestrator.run(*operation_id).await)
        });

        let mut settled = Vec::with_capacity(pass.due.len());
        for (operation_id, outcome) in join_all(runs).await {
            match outcome {
                Ok(status) => settled.push((operation_id, status)),
                Err(e) => error!(operation_id = %operation_id, error = %e, "Reindex job run failed"),
            }
        }
        Ok(settled)
    }

    /// Poll until `shutdown` fires, spawning due jobs in the background
    ///
    /// Jobs still running at shutdown stay Running in the store and are
    /// resumed by the next worker.
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = self.orchestrator.config().poll_interval();
        info!(poll_interval_ms = interval.as_millis() as u64, "Reindex worker started");

        loop {
            match self.poll().await {
                Ok(pass) => {
                    for operation_id in pass.due {
                        if self.orchestrator.spawn(operation_id) {
                            debug!(operation_id = %operation_id, "Reindex job dispatched");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Worker poll failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Reindex worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::EntityIndexer;
    use dicomtag_core::{AddTagEntry, QueryTagLevel, QueryTagStatus, ReindexConfig};
    use dicomtag_storage::{ExtendedQueryTagStore, InMemoryStore, ReindexJob, TagErrorLog};
    use pretty_assertions::assert_eq;

    fn worker(store: &Arc<InMemoryStore>) -> ReindexWorker {
        let catalog = TagCatalog::new(store.clone());
        let error_log = TagErrorLog::new(store.clone(), store.clone());
        let indexer =
            EntityIndexer::new(catalog.clone(), store.clone(), store.clone(), error_log.clone());
        let config = ReindexConfig {
            poll_interval_ms: 10,
            ..ReindexConfig::default()
        };
        let orchestrator =
            ReindexOrchestrator::new(catalog.clone(), store.clone(), store.clone(), indexer, config);
        let deleter = DeleteTagService::new(catalog.clone(), error_log, store.clone());
        ReindexWorker::new(orchestrator, catalog, store.clone(), deleter)
    }

    async fn add(store: &Arc<InMemoryStore>, path: &str) -> i32 {
        TagCatalog::new(store.clone())
            .add_tags(&[AddTagEntry::new(path, "LO", QueryTagLevel::Study)], 10)
            .await
            .unwrap()[0]
    }

    #[tokio::test]
    async fn test_poll_schedules_unscheduled_tags_once() {
        let store = Arc::new(InMemoryStore::new());
        let key = add(&store, "00081090").await;
        let worker = worker(&store);

        let first = worker.poll().await.unwrap();
        assert_eq!(first.due.len(), 1);
        let job = store.get_job(first.due[0]).await.unwrap().unwrap();
        assert_eq!(job.tag_keys, vec![key]);

        // Covered now; only the live job is due
        let second = worker.poll().await.unwrap();
        assert_eq!(second.due, first.due);
    }

    #[tokio::test]
    async fn test_run_once_completes_due_jobs() {
        let store = Arc::new(InMemoryStore::new());
        let key = add(&store, "00081090").await;
        let worker = worker(&store);

        let settled = worker.run_once().await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].1, ReindexJobStatus::Completed);
        let entry = store.get_tag(key).await.unwrap().unwrap();
        assert_eq!(entry.status, QueryTagStatus::Ready);

        assert!(worker.poll().await.unwrap().due.is_empty());
    }

    #[tokio::test]
    async fn test_backed_off_jobs_are_not_due() {
        let store = Arc::new(InMemoryStore::new());
        let key = add(&store, "00081090").await;
        let worker = worker(&store);

        let mut job = ReindexJob::new(vec![key]);
        job.status = ReindexJobStatus::Running;
        job.not_before = Some(Utc::now() + chrono::Duration::minutes(5));
        store.save_job(&job).await.unwrap();

        assert!(worker.poll().await.unwrap().due.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        add(&store, "00081090").await;
        let worker = worker(&store);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
