//! Validation error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::Vr;

/// Reason a value failed validation
///
/// The numeric code is what gets persisted in the tag error log, so
/// discriminants must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ValidationErrorCode {
    ExceedsMaxLength = 1,
    UnexpectedLength = 2,
    InvalidCharacters = 3,
    TooManyComponents = 4,
    TooManyGroups = 5,
    DateIsInvalid = 6,
    DateTimeIsInvalid = 7,
    TimeIsInvalid = 8,
    NumberIsInvalid = 9,
    NumberOutOfRange = 10,
    UidIsInvalid = 11,
    UnsupportedVr = 12,
}

impl ValidationErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use ValidationErrorCode::*;
        let parsed = match code {
            1 => ExceedsMaxLength,
            2 => UnexpectedLength,
            3 => InvalidCharacters,
            4 => TooManyComponents,
            5 => TooManyGroups,
            6 => DateIsInvalid,
            7 => DateTimeIsInvalid,
            8 => TimeIsInvalid,
            9 => NumberIsInvalid,
            10 => NumberOutOfRange,
            11 => UidIsInvalid,
            12 => UnsupportedVr,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn description(&self) -> &'static str {
        use ValidationErrorCode::*;
        match self {
            ExceedsMaxLength => "value exceeds the maximum length",
            UnexpectedLength => "value does not have the required length",
            InvalidCharacters => "value contains invalid characters",
            TooManyComponents => "value contains too many components",
            TooManyGroups => "value contains too many groups",
            DateIsInvalid => "value is not a valid date",
            DateTimeIsInvalid => "value is not a valid date time",
            TimeIsInvalid => "value is not a valid time",
            NumberIsInvalid => "value is not a valid number",
            NumberOutOfRange => "value is out of range for its value representation",
            UidIsInvalid => "value is not a valid UID",
            UnsupportedVr => "value representation is not supported for indexing",
        }
    }
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A value failed the syntax rules of its value representation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value '{value}' of attribute {name} ({vr}) is invalid: {code}")]
pub struct ElementValidationError {
    /// Attribute display name
    pub name: String,
    pub vr: Vr,
    /// The offending literal, verbatim
    pub value: String,
    pub code: ValidationErrorCode,
}

impl ElementValidationError {
    pub fn new(
        name: impl Into<String>,
        vr: Vr,
        value: impl Into<String>,
        code: ValidationErrorCode,
    ) -> Self {
        Self {
            name: name.into(),
            vr,
            value: value.into(),
            code,
        }
    }
}
