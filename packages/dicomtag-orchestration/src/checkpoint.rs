//! Batch planning and the resumable watermark cursor
//!
//! A backfill covers `[cursor, end]` in fixed-size, ascending batches. The
//! persisted cursor is the first watermark not yet processed; it only moves
//! across a contiguous prefix of completed batches, so a resumed job never
//! skips a batch that was in flight when the previous attempt stopped.

use crate::error::{OrchestratorError, Result};
use std::fmt;

/// Inclusive watermark range of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkRange {
    pub start: i64,
    pub end: i64,
}

impl WatermarkRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, watermark: i64) -> bool {
        (self.start..=self.end).contains(&watermark)
    }
}

impl fmt::Display for WatermarkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Deterministic ascending partition of the remaining range
#[derive(Debug, Clone)]
pub struct BatchPlan {
    batches: Vec<WatermarkRange>,
}

impl BatchPlan {
    /// Plan batches from `cursor` to `end` inclusive
    ///
    /// `end = None` means the store held no entities at snapshot time.
    pub fn new(cursor: i64, end: Option<i64>, batch_size: usize) -> Self {
        let Some(end) = end else {
            return Self { batches: Vec::new() };
        };

        let size = batch_size.max(1) as i64;
        let mut batches = Vec::new();
        let mut start = cursor.max(0);
        while start <= end {
            let batch_end = start.saturating_add(size - 1).min(end);
            batches.push(WatermarkRange::new(start, batch_end));
            match batch_end.checked_add(1) {
                Some(next) => start = next,
                None => break,
            }
        }
        Self { batches }
    }

    pub fn batches(&self) -> &[WatermarkRange] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Cursor over completed batches
///
/// Batches must be reported in plan order; out-of-order completion means the
/// caller broke the ordering contract and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCursor {
    next: i64,
}

impl BatchCursor {
    pub fn new(next: i64) -> Self {
        Self { next }
    }

    /// First watermark not yet processed
    pub fn position(&self) -> i64 {
        self.next
    }

    pub fn complete(&mut self, batch: WatermarkRange) -> Result<i64> {
        if batch.start > self.next {
            return Err(OrchestratorError::invariant(format!(
                "Batch {} completed before the cursor at {} reached it",
                batch, self.next
            )));
        }
        self.next = self.next.max(batch.end.saturating_add(1));
        Ok(self.next)
    }
}
