//! Literal to typed condition, dispatched by the tag's VR

use std::str::FromStr;

use crate::model::{QueryTag, Vr};
use crate::validation::{parse_date, parse_date_time, parse_time_ticks};

use super::condition::QueryFilterCondition;
use super::error::QueryParseError;

type ParseFn = fn(&QueryTag, &str) -> Result<QueryFilterCondition, QueryParseError>;

const PARSERS: &[(Vr, ParseFn)] = &[
    (Vr::AE, parse_string),
    (Vr::AS, parse_string),
    (Vr::CS, parse_string),
    (Vr::DA, parse_date_value),
    (Vr::DS, parse_double),
    (Vr::DT, parse_date_time_value),
    (Vr::FD, parse_double),
    (Vr::FL, parse_double),
    (Vr::IS, parse_long),
    (Vr::LO, parse_string),
    (Vr::PN, parse_string),
    (Vr::SH, parse_string),
    (Vr::SL, parse_long),
    (Vr::SS, parse_long),
    (Vr::TM, parse_time_value),
    (Vr::UI, parse_string),
    (Vr::UL, parse_long),
    (Vr::US, parse_long),
];

/// Parse one literal against one tag
///
/// Status is not checked here: callers hand in Ready tags only, which
/// [`QueryCompiler`](super::QueryCompiler) enforces.
pub fn parse(tag: &QueryTag, literal: &str) -> Result<QueryFilterCondition, QueryParseError> {
    let parser = PARSERS
        .iter()
        .find(|(vr, _)| *vr == tag.vr)
        .map(|(_, parser)| *parser)
        .ok_or_else(|| QueryParseError::UnsupportedVr {
            tag: tag.name(),
            vr: tag.vr,
        })?;
    parser(tag, literal)
}

/// Split `min-max` on exactly one '-' when the tag accepts ranges
fn split_range<'a>(tag: &QueryTag, literal: &'a str) -> Option<(&'a str, &'a str)> {
    if !tag.is_range_queryable() {
        return None;
    }
    let mut parts = literal.split('-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(min), Some(max), None) => Some((min.trim(), max.trim())),
        _ => None,
    }
}

/// Shared single-or-range flow for ordered value kinds
fn parse_ranged<T, R, S, P>(
    tag: &QueryTag,
    literal: &str,
    parse_one: P,
    range: R,
    single: S,
) -> Result<QueryFilterCondition, QueryParseError>
where
    T: PartialOrd,
    P: Fn(&str) -> Result<T, QueryParseError>,
    R: FnOnce(QueryTag, T, T) -> QueryFilterCondition,
    S: FnOnce(QueryTag, T) -> QueryFilterCondition,
{
    if let Some((min_literal, max_literal)) = split_range(tag, literal) {
        let min = parse_one(min_literal)?;
        let max = parse_one(max_literal)?;
        if min > max {
            return Err(QueryParseError::InvalidRange {
                tag: tag.name(),
                literal: literal.to_string(),
                min: min_literal.to_string(),
                max: max_literal.to_string(),
            });
        }
        return Ok(range(tag.clone(), min, max));
    }

    let value = parse_one(literal)?;
    Ok(single(tag.clone(), value))
}

fn parse_date_value(tag: &QueryTag, literal: &str) -> Result<QueryFilterCondition, QueryParseError> {
    parse_ranged(
        tag,
        literal,
        |s| {
            parse_date(s).ok_or_else(|| QueryParseError::InvalidDate {
                tag: tag.name(),
                literal: s.to_string(),
            })
        },
        |tag, min, max| QueryFilterCondition::DateRange { tag, min, max },
        |tag, value| QueryFilterCondition::DateEquals { tag, value },
    )
}

fn parse_date_time_value(
    tag: &QueryTag,
    literal: &str,
) -> Result<QueryFilterCondition, QueryParseError> {
    parse_ranged(
        tag,
        literal,
        |s| {
            parse_date_time(s).ok_or_else(|| QueryParseError::InvalidDateTime {
                tag: tag.name(),
                literal: s.to_string(),
            })
        },
        |tag, min, max| QueryFilterCondition::DateTimeRange { tag, min, max },
        |tag, value| QueryFilterCondition::DateTimeEquals { tag, value },
    )
}

fn parse_time_value(tag: &QueryTag, literal: &str) -> Result<QueryFilterCondition, QueryParseError> {
    parse_ranged(
        tag,
        literal,
        |s| {
            parse_time_ticks(s).ok_or_else(|| QueryParseError::InvalidTime {
                tag: tag.name(),
                literal: s.to_string(),
            })
        },
        |tag, min, max| QueryFilterCondition::TimeRange { tag, min, max },
        |tag, ticks| QueryFilterCondition::TimeEquals { tag, ticks },
    )
}

/// Wildcards and collation are the executor's business
fn parse_string(tag: &QueryTag, literal: &str) -> Result<QueryFilterCondition, QueryParseError> {
    Ok(QueryFilterCondition::StringEquals {
        tag: tag.clone(),
        value: literal.to_string(),
    })
}

fn parse_double(tag: &QueryTag, literal: &str) -> Result<QueryFilterCondition, QueryParseError> {
    let value = f64::from_str(literal)
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| QueryParseError::InvalidDouble {
            tag: tag.name(),
            literal: literal.to_string(),
        })?;
    Ok(QueryFilterCondition::DoubleEquals {
        tag: tag.clone(),
        value,
    })
}

/// Integer tags accept `min-max` only when explicitly marked range queryable
fn parse_long(tag: &QueryTag, literal: &str) -> Result<QueryFilterCondition, QueryParseError> {
    parse_ranged(
        tag,
        literal,
        |s| {
            i64::from_str(s).map_err(|_| QueryParseError::InvalidLong {
                tag: tag.name(),
                literal: s.to_string(),
            })
        },
        |tag, min, max| QueryFilterCondition::LongRange { tag, min, max },
        |tag, value| QueryFilterCondition::LongEquals { tag, value },
    )
}
