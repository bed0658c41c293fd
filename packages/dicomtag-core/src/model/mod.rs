//! Domain model shared by every crate in the workspace

pub mod attributes;
pub mod query_tag;
pub mod tag;
pub mod value;

pub use attributes::{AttributeSet, DicomAttribute, EntityKey, InstanceIdentifier, InstanceRecord};
pub use query_tag::{QueryTag, QueryTagLevel, QueryTagSource, QueryTagStatus, TagCatalogEntry};
pub use tag::{DicomTag, IndexDataType, Vr, INDEXABLE_VRS};
pub use value::IndexValue;
