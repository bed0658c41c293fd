//! Storage Domain Layer
//!
//! Port/Adapter pattern for storage backend abstraction

pub mod models;
pub mod ports;

pub use models::{ReindexJob, ReindexJobStatus, TagError, TagFilter};
pub use ports::{EntityStore, ExtendedQueryTagStore, IndexStore, ReindexJobStore, TagErrorStore};
