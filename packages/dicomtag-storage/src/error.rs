//! Error types for dicomtag-storage

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Database errors (SQLite)
    Database,
    /// Serialization/deserialization errors
    Serialization,
    /// No non-deleted catalog entry for the requested key or path
    TagNotFound,
    /// (path, private creator) already registered
    DuplicateTag,
    /// Registration would exceed the configured tag ceiling
    TagCountExceeded,
    /// Add-tag entry rejected before reaching the store
    InvalidTagEntry,
    /// Status change not allowed by the tag lifecycle
    InvalidTransition,
    /// Backing store temporarily unreachable
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
            ErrorKind::TagNotFound => "tag_not_found",
            ErrorKind::DuplicateTag => "duplicate_tag",
            ErrorKind::TagCountExceeded => "tag_count_exceeded",
            ErrorKind::InvalidTagEntry => "invalid_tag_entry",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Infrastructure failure: retrying later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Database | ErrorKind::Unavailable)
    }

    // Convenience constructors
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn tag_not_found(tag: impl fmt::Display) -> Self {
        Self::new(ErrorKind::TagNotFound, format!("Extended query tag not found: {}", tag))
    }

    pub fn duplicate_tag(path: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::DuplicateTag,
            format!("Extended query tag {} already exists", path),
        )
    }

    pub fn tag_count_exceeded(max_allowed: usize, requested_total: usize) -> Self {
        Self::new(
            ErrorKind::TagCountExceeded,
            format!(
                "Adding these tags would bring the total to {}, exceeding the maximum of {}",
                requested_total, max_allowed
            ),
        )
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTransition, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::database(format!("SQLite error: {}", err)).with_source(err)
    }
}

// JSON error conversions
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<dicomtag_core::TagEntryError> for StorageError {
    fn from(err: dicomtag_core::TagEntryError) -> Self {
        let kind = match err {
            dicomtag_core::TagEntryError::DuplicateTag(_) => ErrorKind::DuplicateTag,
            _ => ErrorKind::InvalidTagEntry,
        };
        StorageError::new(kind, err.to_string()).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;
