//! Normalized index values

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::tag::IndexDataType;

/// A validated, normalized value ready to be written into its index partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IndexValue {
    String(String),
    Long(i64),
    Double(f64),
    DateTime(NaiveDateTime),
    PersonName(String),
}

impl IndexValue {
    pub fn data_type(&self) -> IndexDataType {
        match self {
            IndexValue::String(_) => IndexDataType::String,
            IndexValue::Long(_) => IndexDataType::Long,
            IndexValue::Double(_) => IndexDataType::Double,
            IndexValue::DateTime(_) => IndexDataType::DateTime,
            IndexValue::PersonName(_) => IndexDataType::PersonName,
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::String(v) | IndexValue::PersonName(v) => f.write_str(v),
            IndexValue::Long(v) => write!(f, "{}", v),
            IndexValue::Double(v) => write!(f, "{}", v),
            IndexValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}
