/*
 * dicomtag Orchestration - Resumable reindexing of extended query tags
 *
 * Backfills newly registered tags across pre-existing entities without
 * blocking ingestion.
 *
 * Architecture:
 * - Reindex job state machine (persisted through the job store)
 * - Ascending batch plan + contiguous-prefix cursor (checkpoint/resume)
 * - Entity indexer shared by backfill and inline writes
 * - Orchestrator: bounded batch parallelism, Ready barrier, cancellation
 * - Restartable worker loop
 */

// Public modules
pub mod checkpoint;
pub mod error;
pub mod indexer;
pub mod job;
pub mod orchestrator;
pub mod service;
pub mod worker;

// Re-exports
pub use checkpoint::{BatchCursor, BatchPlan, WatermarkRange};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use indexer::{EntityIndexer, IndexStats};
pub use job::{backoff_delay, ReindexJobStateMachine};
pub use orchestrator::{OperationStatus, OperationsClient, ReindexOrchestrator};
pub use service::{AddTagService, AddTagsResponse, DeleteTagService};
pub use worker::{ReindexWorker, WorkerPass};
