//! dicomtag-core - Extended query tag domain
//!
//! Pure, storage-independent building blocks for extended query tags over a
//! Study/Series/Instance object store:
//!
//! - [`model`]: tags, VRs, levels, the catalog entry lifecycle, attributes
//! - [`entry`]: add-tag request validation and normalization
//! - [`validation`]: per-VR value validators, shared by ingestion and queries
//! - [`resolver`]: binding an entity's attributes to declared index tags
//! - [`query`]: literal parsing into typed, range-aware filter conditions
//! - [`config`]: versioned YAML configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dicomtag_core::query::QueryCompiler;
//!
//! let compiler = QueryCompiler::new(&catalog_entries);
//! let conditions = compiler.compile(&[("StudyDate", "20230101-20230105")])?;
//! ```

pub mod config;
pub mod entry;
pub mod model;
pub mod query;
pub mod resolver;
pub mod validation;

pub use config::{ConfigError, IndexingConfig, ReindexConfig, Validatable};
pub use entry::{validate_entries, AddTagEntry, TagDefinition, TagEntryError};
pub use model::{
    AttributeSet, DicomAttribute, DicomTag, EntityKey, IndexDataType, IndexValue,
    InstanceIdentifier, InstanceRecord, QueryTag, QueryTagLevel, QueryTagSource, QueryTagStatus,
    TagCatalogEntry, Vr,
};
pub use query::{QueryCompiler, QueryFilterCondition, QueryParseError};
pub use resolver::{resolve, ResolvedTags};
pub use validation::{validate_value, ElementValidationError, ValidationErrorCode};
