//! String-like value validators (AE, AS, CS, LO, SH, UI, PN)

use crate::model::{IndexValue, Vr};

use super::error::{ElementValidationError, ValidationErrorCode};

const ESC: char = '\u{1b}';

/// Maximum characters per '='-separated person name group
pub const PERSON_NAME_GROUP_MAX_LENGTH: usize = 64;
/// Alphabetic, ideographic and phonetic representations
pub const PERSON_NAME_MAX_GROUPS: usize = 3;
/// Family, given, middle, prefix, suffix
pub const PERSON_NAME_MAX_COMPONENTS: usize = 5;

fn fail(name: &str, vr: Vr, value: &str, code: ValidationErrorCode) -> ElementValidationError {
    ElementValidationError::new(name, vr, value, code)
}

fn is_control_except_esc(c: char) -> bool {
    c.is_control() && c != ESC
}

fn check_max_length(
    value: &str,
    max: usize,
    vr: Vr,
    name: &str,
) -> Result<(), ElementValidationError> {
    if value.chars().count() > max {
        return Err(fail(name, vr, value, ValidationErrorCode::ExceedsMaxLength));
    }
    Ok(())
}

/// Shared rule for the free-text short string VRs
fn check_text(value: &str, max: usize, vr: Vr, name: &str) -> Result<(), ElementValidationError> {
    check_max_length(value, max, vr, name)?;
    if value.contains('\\') || value.chars().any(is_control_except_esc) {
        return Err(fail(name, vr, value, ValidationErrorCode::InvalidCharacters));
    }
    Ok(())
}

pub fn validate_ae(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    check_text(value, 16, Vr::AE, name)?;
    Ok(IndexValue::String(value.to_string()))
}

/// Age string: `nnnD`, `nnnW`, `nnnM` or `nnnY`
pub fn validate_as(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    if value.len() != 4 {
        return Err(fail(name, Vr::AS, value, ValidationErrorCode::UnexpectedLength));
    }
    let bytes = value.as_bytes();
    let digits_ok = bytes[..3].iter().all(u8::is_ascii_digit);
    let unit_ok = matches!(bytes[3], b'D' | b'W' | b'M' | b'Y');
    if !digits_ok || !unit_ok {
        return Err(fail(name, Vr::AS, value, ValidationErrorCode::InvalidCharacters));
    }
    Ok(IndexValue::String(value.to_string()))
}

/// Code string: upper case letters, digits, space and underscore
pub fn validate_cs(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    check_max_length(value, 16, Vr::CS, name)?;
    let valid = value
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == ' ' || c == '_');
    if !valid {
        return Err(fail(name, Vr::CS, value, ValidationErrorCode::InvalidCharacters));
    }
    Ok(IndexValue::String(value.to_string()))
}

pub fn validate_lo(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    check_text(value, 64, Vr::LO, name)?;
    Ok(IndexValue::String(value.to_string()))
}

pub fn validate_sh(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    check_text(value, 16, Vr::SH, name)?;
    Ok(IndexValue::String(value.to_string()))
}

/// Unique identifier: digits and dots, at most 64 characters
pub fn validate_ui(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    let trimmed = value.trim_end_matches(['\0', ' ']);
    if trimmed.len() > 64 {
        return Err(fail(name, Vr::UI, value, ValidationErrorCode::ExceedsMaxLength));
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(fail(name, Vr::UI, value, ValidationErrorCode::UidIsInvalid));
    }
    Ok(IndexValue::String(trimmed.to_string()))
}

/// Person name: up to 3 '='-separated groups of up to 5 '^'-separated components
pub fn validate_pn(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    let groups: Vec<&str> = value.split('=').collect();
    if groups.len() > PERSON_NAME_MAX_GROUPS {
        return Err(fail(name, Vr::PN, value, ValidationErrorCode::TooManyGroups));
    }

    for group in &groups {
        if group.chars().count() > PERSON_NAME_GROUP_MAX_LENGTH {
            return Err(fail(name, Vr::PN, value, ValidationErrorCode::ExceedsMaxLength));
        }
        if group.contains('\\') || group.chars().any(is_control_except_esc) {
            return Err(fail(name, Vr::PN, value, ValidationErrorCode::InvalidCharacters));
        }
    }

    if groups
        .iter()
        .any(|group| group.split('^').count() > PERSON_NAME_MAX_COMPONENTS)
    {
        return Err(fail(name, Vr::PN, value, ValidationErrorCode::TooManyComponents));
    }

    Ok(IndexValue::PersonName(value.to_string()))
}
