//! Numeric value validators (DS, IS, FL, FD, SL, SS, UL, US)
//!
//! Binary VRs arrive as their decimal text rendering; the checks here are
//! strict parses plus the range of the underlying binary width.

use crate::model::{IndexValue, Vr};

use super::error::{ElementValidationError, ValidationErrorCode};

fn fail(name: &str, vr: Vr, value: &str, code: ValidationErrorCode) -> ElementValidationError {
    ElementValidationError::new(name, vr, value, code)
}

fn is_decimal_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')
}

/// Decimal string: at most 16 characters, finite
pub fn validate_ds(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    let trimmed = value.trim_matches(' ');
    if trimmed.len() > 16 {
        return Err(fail(name, Vr::DS, value, ValidationErrorCode::ExceedsMaxLength));
    }
    if !trimmed.chars().all(is_decimal_char) {
        return Err(fail(name, Vr::DS, value, ValidationErrorCode::InvalidCharacters));
    }
    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(IndexValue::Double(parsed)),
        _ => Err(fail(name, Vr::DS, value, ValidationErrorCode::NumberIsInvalid)),
    }
}

/// Integer string: at most 12 characters, within 32-bit signed range
pub fn validate_is(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    let trimmed = value.trim_matches(' ');
    if trimmed.len() > 12 {
        return Err(fail(name, Vr::IS, value, ValidationErrorCode::ExceedsMaxLength));
    }
    bounded_integer(trimmed, i64::from(i32::MIN), i64::from(i32::MAX))
        .map(IndexValue::Long)
        .map_err(|code| fail(name, Vr::IS, value, code))
}

fn validate_float(
    value: &str,
    name: &str,
    vr: Vr,
    single_precision: bool,
) -> Result<IndexValue, ElementValidationError> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|_| fail(name, vr, value, ValidationErrorCode::NumberIsInvalid))?;
    if !parsed.is_finite() {
        return Err(fail(name, vr, value, ValidationErrorCode::NumberIsInvalid));
    }
    if single_precision && parsed.abs() > f64::from(f32::MAX) {
        return Err(fail(name, vr, value, ValidationErrorCode::NumberOutOfRange));
    }
    Ok(IndexValue::Double(parsed))
}

pub fn validate_fl(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    validate_float(value, name, Vr::FL, true)
}

pub fn validate_fd(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    validate_float(value, name, Vr::FD, false)
}

fn bounded_integer(value: &str, min: i64, max: i64) -> Result<i64, ValidationErrorCode> {
    let parsed = value
        .parse::<i64>()
        .map_err(|_| ValidationErrorCode::NumberIsInvalid)?;
    if parsed < min || parsed > max {
        return Err(ValidationErrorCode::NumberOutOfRange);
    }
    Ok(parsed)
}

fn validate_integer(
    value: &str,
    name: &str,
    vr: Vr,
    min: i64,
    max: i64,
) -> Result<IndexValue, ElementValidationError> {
    bounded_integer(value.trim(), min, max)
        .map(IndexValue::Long)
        .map_err(|code| fail(name, vr, value, code))
}

pub fn validate_sl(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    validate_integer(value, name, Vr::SL, i64::from(i32::MIN), i64::from(i32::MAX))
}

pub fn validate_ss(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    validate_integer(value, name, Vr::SS, i64::from(i16::MIN), i64::from(i16::MAX))
}

pub fn validate_ul(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    validate_integer(value, name, Vr::UL, 0, i64::from(u32::MAX))
}

pub fn validate_us(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    validate_integer(value, name, Vr::US, 0, i64::from(u16::MAX))
}
