//! Typed filter conditions

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::model::QueryTag;

/// A single typed predicate against one query tag
///
/// Ranges are inclusive on both ends with `min <= max`. Times are 100ns
/// ticks since midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFilterCondition {
    StringEquals { tag: QueryTag, value: String },
    LongEquals { tag: QueryTag, value: i64 },
    LongRange { tag: QueryTag, min: i64, max: i64 },
    DoubleEquals { tag: QueryTag, value: f64 },
    DateEquals { tag: QueryTag, value: NaiveDate },
    DateRange { tag: QueryTag, min: NaiveDate, max: NaiveDate },
    DateTimeEquals { tag: QueryTag, value: NaiveDateTime },
    DateTimeRange {
        tag: QueryTag,
        min: NaiveDateTime,
        max: NaiveDateTime,
    },
    TimeEquals { tag: QueryTag, ticks: i64 },
    TimeRange { tag: QueryTag, min: i64, max: i64 },
}

impl QueryFilterCondition {
    pub fn tag(&self) -> &QueryTag {
        match self {
            QueryFilterCondition::StringEquals { tag, .. }
            | QueryFilterCondition::LongEquals { tag, .. }
            | QueryFilterCondition::LongRange { tag, .. }
            | QueryFilterCondition::DoubleEquals { tag, .. }
            | QueryFilterCondition::DateEquals { tag, .. }
            | QueryFilterCondition::DateRange { tag, .. }
            | QueryFilterCondition::DateTimeEquals { tag, .. }
            | QueryFilterCondition::DateTimeRange { tag, .. }
            | QueryFilterCondition::TimeEquals { tag, .. }
            | QueryFilterCondition::TimeRange { tag, .. } => tag,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            QueryFilterCondition::LongRange { .. }
                | QueryFilterCondition::DateRange { .. }
                | QueryFilterCondition::DateTimeRange { .. }
                | QueryFilterCondition::TimeRange { .. }
        )
    }
}
