use thiserror::Error;

use crate::model::{QueryTagStatus, Vr};

/// Query literal or attribute rejected at compile time
///
/// Every variant names the tag and the literal exactly as the caller wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryParseError {
    #[error("Invalid date value '{literal}' for attribute {tag}")]
    InvalidDate { tag: String, literal: String },

    #[error("Invalid date time value '{literal}' for attribute {tag}")]
    InvalidDateTime { tag: String, literal: String },

    #[error("Invalid time value '{literal}' for attribute {tag}")]
    InvalidTime { tag: String, literal: String },

    #[error("Invalid double value '{literal}' for attribute {tag}")]
    InvalidDouble { tag: String, literal: String },

    #[error("Invalid long value '{literal}' for attribute {tag}")]
    InvalidLong { tag: String, literal: String },

    /// Range whose lower bound is after its upper bound
    #[error("Invalid range '{literal}' for attribute {tag}: '{min}' is greater than '{max}'")]
    InvalidRange {
        tag: String,
        literal: String,
        min: String,
        max: String,
    },

    #[error("Attribute {tag} has value representation {vr}, which is not queryable")]
    UnsupportedVr { tag: String, vr: Vr },

    #[error("Attribute {tag} is not queryable while its status is {status}")]
    TagNotQueryable { tag: String, status: QueryTagStatus },

    #[error("Unknown query attribute '{0}'")]
    UnknownAttribute(String),
}
