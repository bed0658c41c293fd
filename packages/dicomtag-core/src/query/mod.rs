//! Query literal parsing into typed filter conditions

pub mod compiler;
pub mod condition;
pub mod core_tags;
pub mod error;
pub mod parser;

pub use compiler::QueryCompiler;
pub use condition::QueryFilterCondition;
pub use core_tags::{core_query_tags, is_core_tag};
pub use error::QueryParseError;
pub use parser::parse;
