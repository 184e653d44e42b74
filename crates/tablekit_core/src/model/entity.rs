//! Entity declaration contracts.
//!
//! # Responsibility
//! - Let a type declare its table, properties, columns and key once.
//! - Convert entities to named parameters and rows back to entities.
//!
//! # Invariants
//! - Property names double as parameter names (`:Name`) and select aliases
//!   (`NAME AS Name`), so `FromRow` reads columns by property name.
//! - Declaration order is statement column order.

use crate::db::NamedParams;
use rusqlite::Row;

/// Decodes one result row into a value.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A record type mapped to one table.
///
/// # Example
///
/// ```ignore
/// impl Entity for Person {
///     fn descriptor() -> EntityDescriptor {
///         EntityDescriptor::new()
///             .table("PEOPLE")
///             .key_as("Id", "ID")
///             .property_as("Name", "NAME")
///     }
///
///     fn to_params(&self) -> NamedParams {
///         NamedParams::new()
///             .with("Id", self.id)
///             .with("Name", self.name.clone())
///     }
/// }
/// ```
pub trait Entity: FromRow + 'static {
    /// Static shape of the type; resolved and validated once per process.
    fn descriptor() -> EntityDescriptor;

    /// Values for every declared property, keyed by property name.
    fn to_params(&self) -> NamedParams;
}

/// One declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Explicit column override; the property name is used when absent.
    pub column: Option<String>,
    pub is_key: bool,
}

/// Declared shape of an entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Explicit table override; the type name is used when absent.
    pub table: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
}

impl EntityDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Property stored in a column of the same name.
    pub fn property(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, false)
    }

    pub fn property_as(self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.push(name.into(), Some(column.into()), false)
    }

    /// Key property stored in a column of the same name.
    pub fn key(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, true)
    }

    pub fn key_as(self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.push(name.into(), Some(column.into()), true)
    }

    fn push(mut self, name: String, column: Option<String>, is_key: bool) -> Self {
        self.properties.push(PropertyDescriptor {
            name,
            column,
            is_key,
        });
        self
    }
}
