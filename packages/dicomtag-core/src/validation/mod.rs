//! Value validators
//!
//! One pure function per indexable VR, selected through [`validator_for`].
//! Every validator both checks the raw literal and normalizes it to the
//! [`IndexValue`] stored in the index partition for that VR. Ingestion,
//! backfill and query literal parsing all go through the same functions.

pub mod error;
pub mod numeric;
pub mod temporal;
pub mod text;

use chrono::NaiveTime;

use crate::model::{IndexValue, Vr};

pub use error::{ElementValidationError, ValidationErrorCode};
pub use temporal::{parse_date, parse_date_time, parse_time_ticks, TICKS_PER_SECOND};

/// `(raw literal, attribute name) -> normalized value`
pub type ValueValidator = fn(&str, &str) -> Result<IndexValue, ElementValidationError>;

fn validate_da(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    parse_date(value)
        .map(|date| IndexValue::DateTime(date.and_time(NaiveTime::MIN)))
        .ok_or_else(|| {
            ElementValidationError::new(name, Vr::DA, value, ValidationErrorCode::DateIsInvalid)
        })
}

fn validate_dt(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    parse_date_time(value).map(IndexValue::DateTime).ok_or_else(|| {
        ElementValidationError::new(name, Vr::DT, value, ValidationErrorCode::DateTimeIsInvalid)
    })
}

fn validate_tm(value: &str, name: &str) -> Result<IndexValue, ElementValidationError> {
    parse_time_ticks(value).map(IndexValue::Long).ok_or_else(|| {
        ElementValidationError::new(name, Vr::TM, value, ValidationErrorCode::TimeIsInvalid)
    })
}

const VALIDATORS: &[(Vr, ValueValidator)] = &[
    (Vr::AE, text::validate_ae),
    (Vr::AS, text::validate_as),
    (Vr::CS, text::validate_cs),
    (Vr::DA, validate_da),
    (Vr::DS, numeric::validate_ds),
    (Vr::DT, validate_dt),
    (Vr::FD, numeric::validate_fd),
    (Vr::FL, numeric::validate_fl),
    (Vr::IS, numeric::validate_is),
    (Vr::LO, text::validate_lo),
    (Vr::PN, text::validate_pn),
    (Vr::SH, text::validate_sh),
    (Vr::SL, numeric::validate_sl),
    (Vr::SS, numeric::validate_ss),
    (Vr::TM, validate_tm),
    (Vr::UI, text::validate_ui),
    (Vr::UL, numeric::validate_ul),
    (Vr::US, numeric::validate_us),
];

/// Look up the validator for a VR; `None` for VRs that cannot be indexed
pub fn validator_for(vr: Vr) -> Option<ValueValidator> {
    VALIDATORS
        .iter()
        .find(|(candidate, _)| *candidate == vr)
        .map(|(_, validator)| *validator)
}

/// Validate and normalize one raw attribute value
///
/// Trailing padding (space or NUL) is stripped first. An empty value is
/// reported as `Ok(None)`: absent, not invalid.
pub fn validate_value(
    vr: Vr,
    raw: &str,
    name: &str,
) -> Result<Option<IndexValue>, ElementValidationError> {
    let validator = validator_for(vr).ok_or_else(|| {
        ElementValidationError::new(name, vr, raw, ValidationErrorCode::UnsupportedVr)
    })?;

    let value = raw.trim_end_matches(['\0', ' ']);
    if value.is_empty() {
        return Ok(None);
    }
    validator(value, name).map(Some)
}
