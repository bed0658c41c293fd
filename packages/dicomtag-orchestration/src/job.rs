use crate::error::{OrchestratorError, Result};
use chrono::{Duration, Utc};
use dicomtag_storage::{ReindexJob, ReindexJobStatus};

/// Longest backoff exponent; 2^10 seconds is about 17 minutes
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Delay before the `attempt`-th retry (2s, 4s, 8s, ...)
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::seconds(2i64.pow(attempt.min(MAX_BACKOFF_EXPONENT)))
}

/// Guarded transitions over a persisted [`ReindexJob`]
///
/// ```text
/// NotStarted ──► Running ──► Completed
///     │           │  ▲
///     │           └──┘ suspend (attempt += 1, backoff)
///     │           │
///     └───────────┴──► Failed | Canceled
/// ```
pub struct ReindexJobStateMachine {
    job: ReindexJob,
}

impl ReindexJobStateMachine {
    pub fn new(job: ReindexJob) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &ReindexJob {
        &self.job
    }

    fn invalid(&self, to: ReindexJobStatus) -> OrchestratorError {
        OrchestratorError::InvalidStateTransition {
            from: self.job.status.to_string(),
            to: to.to_string(),
        }
    }

    fn touch(&mut self) {
        self.job.updated_at = Utc::now();
    }

    /// Transition: NOT_STARTED → RUNNING, or resume a suspended RUNNING job
    pub fn start(&mut self) -> Result<()> {
        match self.job.status {
            ReindexJobStatus::NotStarted | ReindexJobStatus::Running => {
                self.job.status = ReindexJobStatus::Running;
                self.job.not_before = None;
                self.touch();
                Ok(())
            }
            _ => Err(self.invalid(ReindexJobStatus::Running)),
        }
    }

    /// Fix the end of the backfill range; later calls keep the first snapshot
    pub fn snapshot_end(&mut self, max_watermark: Option<i64>) -> bool {
        if self.job.end_watermark_resolved {
            return false;
        }
        self.job.end_watermark = max_watermark;
        self.job.end_watermark_resolved = true;
        self.touch();
        true
    }

    /// Move the cursor past a completed batch
    ///
    /// Forward progress ends a failure streak, so the retry budget starts
    /// over.
    pub fn advance(&mut self, next_watermark: i64) -> Result<()> {
        if self.job.status != ReindexJobStatus::Running {
            return Err(self.invalid(ReindexJobStatus::Running));
        }
        if next_watermark < self.job.next_watermark {
            return Err(OrchestratorError::invariant(format!(
                "Cursor of job {} cannot move back from {} to {}",
                self.job.operation_id, self.job.next_watermark, next_watermark
            )));
        }
        if next_watermark > self.job.next_watermark {
            self.job.attempt = 0;
            self.job.error = None;
        }
        self.job.next_watermark = next_watermark;
        self.touch();
        Ok(())
    }

    /// Remove tags that left the lifecycle (deleted while the job ran)
    pub fn retain_tags(&mut self, keep: impl Fn(i32) -> bool) -> Vec<i32> {
        let (kept, dropped): (Vec<i32>, Vec<i32>) =
            self.job.tag_keys.iter().partition(|key| keep(**key));
        if !dropped.is_empty() {
            self.job.tag_keys = kept;
            self.touch();
        }
        dropped
    }

    /// Every watermark up to the snapshot end is behind the cursor
    pub fn is_drained(&self) -> bool {
        self.job.end_watermark_resolved
            && self
                .job
                .end_watermark
                .map_or(true, |end| self.job.next_watermark > end)
    }

    pub fn ensure_drained(&self) -> Result<()> {
        if self.is_drained() {
            return Ok(());
        }
        Err(OrchestratorError::invariant(format!(
            "Job {} has unprocessed batches (cursor {}, end {:?})",
            self.job.operation_id, self.job.next_watermark, self.job.end_watermark
        )))
    }

    /// Transition: RUNNING → COMPLETED
    pub fn complete(&mut self) -> Result<()> {
        if self.job.status != ReindexJobStatus::Running {
            return Err(self.invalid(ReindexJobStatus::Completed));
        }
        self.ensure_drained()?;
        self.job.status = ReindexJobStatus::Completed;
        self.job.error = None;
        self.job.not_before = None;
        self.touch();
        Ok(())
    }

    /// Record an infrastructure failure
    ///
    /// The job stays RUNNING with a backoff until `max_retries` suspensions
    /// have been used up, then becomes FAILED. Returns the resulting status.
    pub fn suspend(&mut self, error: String, max_retries: u32) -> Result<ReindexJobStatus> {
        if self.job.status != ReindexJobStatus::Running {
            return Err(self.invalid(ReindexJobStatus::Running));
        }
        self.job.attempt += 1;
        self.job.error = Some(error);
        if self.job.attempt > max_retries {
            self.job.status = ReindexJobStatus::Failed;
            self.job.not_before = None;
        } else {
            self.job.not_before = Some(Utc::now() + backoff_delay(self.job.attempt));
        }
        self.touch();
        Ok(self.job.status)
    }

    /// Transition: NOT_STARTED | RUNNING → FAILED
    pub fn fail(&mut self, error: String) -> Result<()> {
        if self.job.status.is_terminal() {
            return Err(self.invalid(ReindexJobStatus::Failed));
        }
        self.job.status = ReindexJobStatus::Failed;
        self.job.error = Some(error);
        self.job.not_before = None;
        self.touch();
        Ok(())
    }

    /// Transition: NOT_STARTED | RUNNING → CANCELED
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.job.status.is_terminal() {
            return Err(self.invalid(ReindexJobStatus::Canceled));
        }
        self.job.status = ReindexJobStatus::Canceled;
        self.job.error = Some(reason.into());
        self.job.not_before = None;
        self.touch();
        Ok(())
    }
}
