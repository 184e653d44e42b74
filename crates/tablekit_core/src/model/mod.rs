//! Entity declarations and resolved table metadata.
//!
//! # Responsibility
//! - Define how record types describe their table mapping.
//! - Resolve, validate and cache that mapping once per type.
//!
//! # Invariants
//! - Resolved metadata always has exactly one key column.
//! - Table and column identifiers never come from caller input at call time.

pub mod entity;
pub mod metadata;
