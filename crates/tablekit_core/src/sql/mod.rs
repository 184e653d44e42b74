//! SQL statement generation.
//!
//! # Responsibility
//! - Build entity CRUD statements from resolved metadata (`builder`).
//! - Build the row-numbered page + count statement pair (`paging`).
//!
//! # Invariants
//! - Generated SQL never embeds values; values travel as named parameters.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod builder;
pub mod paging;

pub use builder::StatementBuilder;
pub use paging::{PageRequest, PagedStatement};

/// Builder misuse detected before any SQL is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    /// Update requested for an entity whose only column is its key.
    NoUpdatableColumns { entity: String },
    InvalidPageSize(i64),
}

impl Display for StatementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoUpdatableColumns { entity } => {
                write!(f, "entity `{entity}` has no non-key columns to update")
            }
            Self::InvalidPageSize(size) => write!(f, "page size must be positive, got {size}"),
        }
    }
}

impl Error for StatementError {}

pub(crate) fn where_clause(filter: Option<&str>) -> String {
    clause("WHERE", filter)
}

pub(crate) fn order_by_clause(order_by: Option<&str>) -> String {
    clause("ORDER BY", order_by)
}

fn clause(keyword: &str, fragment: Option<&str>) -> String {
    match fragment.map(str::trim) {
        Some(text) if !text.is_empty() => format!(" {keyword} {text}"),
        _ => String::new(),
    }
}
