//! Storage Infrastructure Layer
//!
//! Backends implementing every storage port

pub mod memory_store;
pub use memory_store::InMemoryStore;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteStore;
