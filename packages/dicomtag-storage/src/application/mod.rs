//! Application services over the storage ports

pub mod catalog;
pub mod error_log;

pub use catalog::TagCatalog;
pub use error_log::TagErrorLog;
