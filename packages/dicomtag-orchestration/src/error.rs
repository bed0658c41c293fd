use dicomtag_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job already running: {0}")]
    AlreadyRunning(Uuid),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Tag {key} is {status} and cannot be reindexed")]
    TagNotReindexable { key: i32, status: String },

    /// Programming error: e.g. completing a job with unprocessed batches
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl OrchestratorError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Classification driving suspend / fail decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::Storage(e) if e.is_transient() => ErrorCategory::Transient,
            OrchestratorError::Storage(_)
            | OrchestratorError::JobNotFound(_)
            | OrchestratorError::AlreadyRunning(_)
            | OrchestratorError::TagNotFound(_)
            | OrchestratorError::TagNotReindexable { .. } => ErrorCategory::Permanent,
            OrchestratorError::InvalidStateTransition { .. }
            | OrchestratorError::InvariantViolation(_) => ErrorCategory::Infrastructure,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

/// Error category for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient error - suspend the batch and retry with backoff (store unavailable, busy)
    Transient,
    /// Permanent error - don't retry (unknown tag, bad configuration)
    Permanent,
    /// Infrastructure error - alert ops (invariant violations, corrupt state)
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
