//! End-to-end backfill scenarios over the in-memory store

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dicomtag_core::{
    AddTagEntry, AttributeSet, DicomAttribute, DicomTag, IndexDataType, IndexValue,
    InstanceIdentifier, InstanceRecord, QueryTagLevel, QueryTagStatus, ReindexConfig,
    ValidationErrorCode, Vr,
};
use dicomtag_orchestration::{
    DeleteTagService, EntityIndexer, OperationsClient, ReindexOrchestrator,
};
use dicomtag_storage::{
    EntityStore, ExtendedQueryTagStore, InMemoryStore, IndexStore, ReindexJobStatus,
    ReindexJobStore, StorageError, TagCatalog, TagErrorLog, TagErrorStore,
};
use pretty_assertions::assert_eq;
use tokio::sync::Notify;
use uuid::Uuid;

const WEIGHT: DicomTag = DicomTag::new(0x0010, 0x1030);
const MODEL: DicomTag = DicomTag::new(0x0008, 0x1090);

/// Entity store that can fail or pause on the batch holding one watermark
struct ControlledEntities {
    inner: Arc<InMemoryStore>,
    trigger: i64,
    failures_left: AtomicU32,
    pause_armed: AtomicBool,
    reached: Notify,
    resume: Notify,
}

impl ControlledEntities {
    fn new(inner: Arc<InMemoryStore>, trigger: i64) -> Self {
        Self {
            inner,
            trigger,
            failures_left: AtomicU32::new(0),
            pause_armed: AtomicBool::new(false),
            reached: Notify::new(),
            resume: Notify::new(),
        }
    }

    fn fail_times(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    fn arm_pause(&self) {
        self.pause_armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for ControlledEntities {
    async fn max_watermark(&self) -> dicomtag_storage::Result<Option<i64>> {
        self.inner.max_watermark().await
    }

    async fn enumerate_watermarks(&self, start: i64, end: i64) -> dicomtag_storage::Result<Vec<i64>> {
        if (start..=end).contains(&self.trigger) {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StorageError::unavailable("entity store offline"));
            }
            if self.pause_armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
        }
        self.inner.enumerate_watermarks(start, end).await
    }

    async fn get_instance(&self, watermark: i64) -> dicomtag_storage::Result<Option<InstanceRecord>> {
        self.inner.get_instance(watermark).await
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    entities: Arc<ControlledEntities>,
    catalog: TagCatalog,
    error_log: TagErrorLog,
    orchestrator: ReindexOrchestrator,
}

impl Harness {
    fn new(trigger: i64, max_parallel_batches: usize) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let entities = Arc::new(ControlledEntities::new(store.clone(), trigger));
        let catalog = TagCatalog::new(store.clone());
        let error_log = TagErrorLog::new(store.clone(), store.clone());
        let indexer = EntityIndexer::new(
            catalog.clone(),
            entities.clone(),
            store.clone(),
            error_log.clone(),
        );
        let config = ReindexConfig {
            batch_size: 100,
            max_parallel_batches,
            max_retries: 2,
            poll_interval_ms: 10,
        };
        let orchestrator = ReindexOrchestrator::new(
            catalog.clone(),
            store.clone(),
            entities.clone(),
            indexer,
            config,
        );
        Self {
            store,
            entities,
            catalog,
            error_log,
            orchestrator,
        }
    }

    /// Instances 1..=count, one series each, with a weight and a model name
    fn seed(&self, count: i64, bad_weight_at: Option<i64>) {
        for watermark in 1..=count {
            let weight = if Some(watermark) == bad_weight_at {
                "seventy".to_string()
            } else {
                format!("{}.5", 40 + watermark % 60)
            };
            self.store.insert_instance(InstanceRecord {
                watermark,
                identifier: InstanceIdentifier::new(
                    "1.2.840",
                    format!("1.2.840.{}", watermark),
                    format!("1.2.840.{}.1", watermark),
                ),
                attributes: AttributeSet::new()
                    .with(DicomAttribute::new(WEIGHT, Vr::DS, weight))
                    .with(DicomAttribute::new(MODEL, Vr::LO, "Scanner")),
            });
        }
    }

    async fn add(&self, path: &str, vr: &str) -> i32 {
        self.catalog
            .add_tags(&[AddTagEntry::new(path, vr, QueryTagLevel::Instance)], 10)
            .await
            .unwrap()[0]
    }

    async fn status_of(&self, key: i32) -> Option<QueryTagStatus> {
        self.store.get_tag(key).await.unwrap().map(|entry| entry.status)
    }

    async fn wait_terminal(&self, operation_id: Uuid) -> ReindexJobStatus {
        let wait = async {
            loop {
                if self.orchestrator.is_completed(operation_id).await.unwrap() {
                    return self.orchestrator.get_status(operation_id).await.unwrap().status;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .expect("job did not settle")
    }
}

#[tokio::test]
async fn test_backfill_logs_one_bad_entity_and_completes() {
    let h = Harness::new(-1, 4);
    h.seed(1000, Some(500));
    let key = h.add("00101030", "DS").await;

    let job = h.orchestrator.create_job(&[key]).await.unwrap();
    let status = h.orchestrator.run(job.operation_id).await.unwrap();

    assert_eq!(status, ReindexJobStatus::Completed);
    assert_eq!(h.status_of(key).await, Some(QueryTagStatus::Ready));
    assert_eq!(h.store.count_rows(key).await.unwrap(), 999);

    let errors = h.error_log.get_errors("00101030").await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].watermark, 500);
    assert_eq!(errors[0].error_code, ValidationErrorCode::InvalidCharacters);

    let saved = h.store.get_job(job.operation_id).await.unwrap().unwrap();
    assert_eq!(saved.end_watermark, Some(1000));
    assert_eq!(saved.next_watermark, 1001);
}

#[tokio::test]
async fn test_rerun_over_ready_tag_is_idempotent() {
    let h = Harness::new(-1, 4);
    h.seed(300, Some(42));
    let key = h.add("00101030", "DS").await;

    let first = h.orchestrator.create_job(&[key]).await.unwrap();
    h.orchestrator.run(first.operation_id).await.unwrap();

    let second = h.orchestrator.create_job(&[key]).await.unwrap();
    assert_ne!(second.operation_id, first.operation_id);
    assert_eq!(
        h.orchestrator.run(second.operation_id).await.unwrap(),
        ReindexJobStatus::Completed
    );

    assert_eq!(h.store.count_rows(key).await.unwrap(), 299);
    assert_eq!(h.store.get_errors(key).await.unwrap().len(), 1);
    assert_eq!(h.status_of(key).await, Some(QueryTagStatus::Ready));
}

#[tokio::test]
async fn test_store_outage_suspends_then_resumes_from_cursor() {
    let h = Harness::new(250, 2);
    h.seed(1000, None);
    let key = h.add("00101030", "DS").await;
    h.entities.fail_times(1);

    let job = h.orchestrator.create_job(&[key]).await.unwrap();
    let status = h.orchestrator.run(job.operation_id).await.unwrap();
    assert_eq!(status, ReindexJobStatus::Running);

    let suspended = h.store.get_job(job.operation_id).await.unwrap().unwrap();
    assert_eq!(suspended.attempt, 1);
    assert_eq!(suspended.next_watermark, 200);
    assert!(suspended.not_before.is_some());
    assert!(suspended.error.is_some());
    assert_eq!(h.status_of(key).await, Some(QueryTagStatus::Reindexing));

    let status = h.orchestrator.run(job.operation_id).await.unwrap();
    assert_eq!(status, ReindexJobStatus::Completed);
    assert_eq!(h.store.count_rows(key).await.unwrap(), 1000);
    assert_eq!(h.status_of(key).await, Some(QueryTagStatus::Ready));
}

#[tokio::test]
async fn test_retries_exhausted_fails_job_and_restart_resumes() {
    let h = Harness::new(250, 1);
    h.seed(400, None);
    let key = h.add("00101030", "DS").await;
    h.entities.fail_times(u32::MAX);

    let job = h.orchestrator.create_job(&[key]).await.unwrap();
    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(h.orchestrator.run(job.operation_id).await.unwrap());
    }
    assert_eq!(
        statuses,
        vec![
            ReindexJobStatus::Running,
            ReindexJobStatus::Running,
            ReindexJobStatus::Failed
        ]
    );
    assert_eq!(h.status_of(key).await, Some(QueryTagStatus::Reindexing));

    h.entities.fail_times(0);
    let retry = h.orchestrator.create_job(&[key]).await.unwrap();
    assert_eq!(retry.resumed_from, Some(job.operation_id));
    assert_eq!(retry.next_watermark, 200);
    assert_eq!(retry.end_watermark, Some(400));

    assert_eq!(
        h.orchestrator.run(retry.operation_id).await.unwrap(),
        ReindexJobStatus::Completed
    );
    assert_eq!(h.store.count_rows(key).await.unwrap(), 400);
}

#[tokio::test]
async fn test_cancel_at_wave_boundary_leaves_tag_reindexing() {
    let h = Harness::new(350, 1);
    h.seed(1000, None);
    let key = h.add("00101030", "DS").await;
    h.entities.arm_pause();

    let operation_id = h.orchestrator.start(&[key]).await.unwrap();
    h.entities.reached.notified().await;
    assert!(h.orchestrator.cancel(operation_id).await.unwrap());
    h.entities.resume.notify_one();

    assert_eq!(h.wait_terminal(operation_id).await, ReindexJobStatus::Canceled);
    assert_eq!(h.status_of(key).await, Some(QueryTagStatus::Reindexing));

    // The in-flight batch finished; nothing after it ran
    let canceled = h.store.get_job(operation_id).await.unwrap().unwrap();
    assert_eq!(canceled.next_watermark, 400);
    assert_eq!(h.store.count_rows(key).await.unwrap(), 399);

    let resumed = h.orchestrator.create_job(&[key]).await.unwrap();
    assert_eq!(resumed.next_watermark, 400);
    assert_eq!(
        h.orchestrator.run(resumed.operation_id).await.unwrap(),
        ReindexJobStatus::Completed
    );
    assert_eq!(h.store.count_rows(key).await.unwrap(), 1000);
    assert_eq!(h.status_of(key).await, Some(QueryTagStatus::Ready));
}

#[tokio::test]
async fn test_cancel_lets_the_whole_wave_finish() {
    // Waves of two: [0, 99] [100, 199], then [200, 299] [300, 399]
    let h = Harness::new(250, 2);
    h.seed(1000, None);
    let key = h.add("00101030", "DS").await;
    h.entities.arm_pause();

    let operation_id = h.orchestrator.start(&[key]).await.unwrap();
    h.entities.reached.notified().await;
    assert!(h.orchestrator.cancel(operation_id).await.unwrap());
    h.entities.resume.notify_one();

    assert_eq!(h.wait_terminal(operation_id).await, ReindexJobStatus::Canceled);
    let canceled = h.store.get_job(operation_id).await.unwrap().unwrap();
    assert_eq!(canceled.next_watermark, 400);
    assert_eq!(h.store.count_rows(key).await.unwrap(), 399);
}

#[tokio::test]
async fn test_tag_deleted_mid_job_is_dropped() {
    let h = Harness::new(150, 1);
    h.seed(500, None);
    let weight = h.add("00101030", "DS").await;
    let model = h.add("00081090", "LO").await;
    h.entities.arm_pause();

    let operation_id = h.orchestrator.start(&[weight, model]).await.unwrap();
    h.entities.reached.notified().await;

    let deleter = DeleteTagService::new(h.catalog.clone(), h.error_log.clone(), h.store.clone());
    deleter.delete("00081090", None).await.unwrap();
    h.entities.resume.notify_one();

    assert_eq!(h.wait_terminal(operation_id).await, ReindexJobStatus::Completed);
    let job = h.store.get_job(operation_id).await.unwrap().unwrap();
    assert_eq!(job.tag_keys, vec![weight]);

    assert_eq!(h.status_of(model).await, None);
    assert_eq!(h.store.count_rows(model).await.unwrap(), 0);
    assert_eq!(h.status_of(weight).await, Some(QueryTagStatus::Ready));
    assert_eq!(h.store.count_rows(weight).await.unwrap(), 500);
}

#[tokio::test]
async fn test_job_with_every_tag_deleted_is_canceled() {
    let h = Harness::new(-1, 1);
    h.seed(10, None);
    let key = h.add("00101030", "DS").await;
    let job = h.orchestrator.create_job(&[key]).await.unwrap();

    let deleter = DeleteTagService::new(h.catalog.clone(), h.error_log.clone(), h.store.clone());
    deleter.delete("00101030", None).await.unwrap();

    assert_eq!(
        h.orchestrator.run(job.operation_id).await.unwrap(),
        ReindexJobStatus::Canceled
    );
}

#[tokio::test]
async fn test_writes_after_snapshot_are_indexed_inline() {
    let h = Harness::new(-1, 2);
    h.seed(50, None);
    let key = h.add("00101030", "DS").await;

    let job = h.orchestrator.create_job(&[key]).await.unwrap();
    h.orchestrator.run(job.operation_id).await.unwrap();

    let late = InstanceRecord {
        watermark: 51,
        identifier: InstanceIdentifier::new("1.2.840", "1.2.840.51", "1.2.840.51.1"),
        attributes: AttributeSet::new().with(DicomAttribute::new(WEIGHT, Vr::DS, "80")),
    };
    h.store.insert_instance(late.clone());
    let indexer = EntityIndexer::new(
        h.catalog.clone(),
        h.entities.clone(),
        h.store.clone(),
        h.error_log.clone(),
    );
    indexer.index_instance(&late).await.unwrap();

    let entity = dicomtag_core::EntityKey::for_level(QueryTagLevel::Instance, &late.identifier);
    assert_eq!(
        h.store.get_value(key, IndexDataType::Double, &entity).await.unwrap(),
        Some(IndexValue::Double(80.0))
    );
    assert_eq!(h.store.count_rows(key).await.unwrap(), 51);
}
