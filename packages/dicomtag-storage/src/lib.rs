//! dicomtag-storage - Extended query tag persistence
//!
//! ## Layers
//!
//! ```text
//! application/ (TagCatalog, TagErrorLog)
//!           ↓
//! domain/ (records, port traits)
//!           ↓
//! infrastructure/ (InMemory, SQLite)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dicomtag_storage::{SqliteStore, TagCatalog};
//!
//! let store = Arc::new(SqliteStore::open("dicomtag.db")?);
//! let catalog = TagCatalog::new(store.clone());
//! let keys = catalog.add_tags(&entries, config.max_allowed_tag_count).await?;
//! ```

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use application::{TagCatalog, TagErrorLog};
pub use domain::{
    EntityStore, ExtendedQueryTagStore, IndexStore, ReindexJob, ReindexJobStatus,
    ReindexJobStore, TagError, TagErrorStore, TagFilter,
};

pub use infrastructure::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteStore;
