//! Compile `(attribute, literal)` pairs against core and extended tags

use std::collections::HashMap;

use tracing::debug;

use crate::model::{QueryTag, QueryTagStatus, TagCatalogEntry};

use super::condition::QueryFilterCondition;
use super::core_tags::core_query_tags;
use super::error::QueryParseError;
use super::parser::parse;

/// Query tag lookup over one catalog snapshot
///
/// Attributes are addressed by 8 hex digit path (any case) or, for core
/// tags, by keyword. Extended tags that are not Ready are kept so that a
/// query naming them fails with `TagNotQueryable` instead of looking unknown.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    tags: HashMap<String, QueryTag>,
}

impl QueryCompiler {
    pub fn new(extended: &[TagCatalogEntry]) -> Self {
        let mut tags = HashMap::new();

        for tag in core_query_tags() {
            tags.insert(tag.path(), tag.clone());
            tags.insert(tag.name().to_ascii_uppercase(), tag.clone());
        }

        for entry in extended {
            let Some(tag) = QueryTag::from_entry(entry) else {
                continue;
            };
            match tags.get(&tag.path()) {
                Some(existing) if !existing.is_extended() => continue,
                // Several private creators may share a path; prefer a queryable one
                Some(existing) if existing.status() == QueryTagStatus::Ready => continue,
                _ => {
                    tags.insert(tag.path(), tag);
                }
            }
        }

        Self { tags }
    }

    /// Look up a tag by path or core keyword, queryable or not
    pub fn lookup(&self, attribute: &str) -> Option<&QueryTag> {
        self.tags.get(&attribute.trim().to_ascii_uppercase())
    }

    /// Compile each pair into one condition; the caller combines them
    pub fn compile(
        &self,
        filters: &[(&str, &str)],
    ) -> Result<Vec<QueryFilterCondition>, QueryParseError> {
        filters
            .iter()
            .map(|(attribute, literal)| self.compile_one(attribute, literal))
            .collect()
    }

    pub fn compile_one(
        &self,
        attribute: &str,
        literal: &str,
    ) -> Result<QueryFilterCondition, QueryParseError> {
        let tag = self
            .lookup(attribute)
            .ok_or_else(|| QueryParseError::UnknownAttribute(attribute.to_string()))?;

        let status = tag.status();
        if status != QueryTagStatus::Ready {
            debug!(attribute, status = %status, "Rejected query on non-ready tag");
            return Err(QueryParseError::TagNotQueryable {
                tag: tag.name(),
                status,
            });
        }

        parse(tag, literal)
    }
}
