//! Entity metadata resolution and process-wide memoization.
//!
//! # Responsibility
//! - Turn an `EntityDescriptor` into table, column and key information.
//! - Reject unusable declarations before any SQL is generated.
//!
//! # Invariants
//! - Exactly one key property per entity.
//! - Property names and column names are unique within an entity.
//! - Every identifier is a plain SQL identifier; tables may carry one
//!   `schema.` qualifier.
//! - Resolved metadata is immutable and cached per `TypeId`.

use crate::model::entity::{Entity, EntityDescriptor};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));
static TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*\.)?[A-Za-z_][A-Za-z0-9_]*$").expect("valid table regex")
});
static METADATA_CACHE: Lazy<RwLock<HashMap<TypeId, Arc<EntityMeta>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    NoProperties {
        entity: String,
    },
    MissingKey {
        entity: String,
    },
    MultipleKeys {
        entity: String,
        keys: Vec<String>,
    },
    DuplicateProperty {
        entity: String,
        property: String,
    },
    DuplicateColumn {
        entity: String,
        column: String,
    },
    InvalidIdentifier {
        entity: String,
        identifier: String,
    },
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoProperties { entity } => write!(f, "entity `{entity}` declares no properties"),
            Self::MissingKey { entity } => write!(f, "entity `{entity}` declares no key property"),
            Self::MultipleKeys { entity, keys } => write!(
                f,
                "entity `{entity}` declares more than one key: {}",
                keys.join(", ")
            ),
            Self::DuplicateProperty { entity, property } => {
                write!(f, "entity `{entity}` declares property `{property}` twice")
            }
            Self::DuplicateColumn { entity, column } => {
                write!(f, "entity `{entity}` maps column `{column}` twice")
            }
            Self::InvalidIdentifier { entity, identifier } => write!(
                f,
                "entity `{entity}` uses `{identifier}`, which is not a plain SQL identifier"
            ),
        }
    }
}

impl Error for MetadataError {}

/// One mapped property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub property: String,
    pub column: String,
    pub is_key: bool,
}

/// Validated table/column/key information for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    entity: String,
    table: String,
    columns: Vec<ColumnMeta>,
    key_index: usize,
}

impl EntityMeta {
    /// Short entity name used in errors and log events.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in declaration order, key included.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn key(&self) -> &ColumnMeta {
        &self.columns[self.key_index]
    }

    pub fn non_key_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|column| !column.is_key)
    }
}

/// Returns the cached metadata for `T`, resolving it on first use.
///
/// Failed resolutions are not cached; every call reports the error again.
pub fn metadata_for<T: Entity>() -> Result<Arc<EntityMeta>, MetadataError> {
    let type_id = TypeId::of::<T>();
    if let Some(meta) = METADATA_CACHE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&type_id)
    {
        return Ok(Arc::clone(meta));
    }

    let meta = Arc::new(resolve(short_type_name::<T>(), &T::descriptor())?);
    debug!(
        "event=metadata_resolve module=model status=ok entity={} table={} columns={}",
        meta.entity(),
        meta.table(),
        meta.columns().len()
    );

    let mut cache = METADATA_CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(cache.entry(type_id).or_insert(meta)))
}

/// Resolves and validates a descriptor without touching the cache.
///
/// `entity` is the fallback table name when the descriptor has no override.
pub fn resolve(entity: &str, descriptor: &EntityDescriptor) -> Result<EntityMeta, MetadataError> {
    let entity_name = entity.to_string();
    let table = descriptor
        .table
        .clone()
        .unwrap_or_else(|| entity_name.clone());
    if !TABLE_RE.is_match(&table) {
        return Err(MetadataError::InvalidIdentifier {
            entity: entity_name,
            identifier: table,
        });
    }

    if descriptor.properties.is_empty() {
        return Err(MetadataError::NoProperties {
            entity: entity_name,
        });
    }

    let mut columns = Vec::with_capacity(descriptor.properties.len());
    let mut seen_properties = HashSet::new();
    let mut seen_columns = HashSet::new();
    for property in &descriptor.properties {
        let column = property
            .column
            .clone()
            .unwrap_or_else(|| property.name.clone());

        for identifier in [&property.name, &column] {
            if !IDENTIFIER_RE.is_match(identifier) {
                return Err(MetadataError::InvalidIdentifier {
                    entity: entity_name,
                    identifier: identifier.clone(),
                });
            }
        }
        if !seen_properties.insert(property.name.to_ascii_lowercase()) {
            return Err(MetadataError::DuplicateProperty {
                entity: entity_name,
                property: property.name.clone(),
            });
        }
        if !seen_columns.insert(column.to_ascii_lowercase()) {
            return Err(MetadataError::DuplicateColumn {
                entity: entity_name,
                column,
            });
        }

        columns.push(ColumnMeta {
            property: property.name.clone(),
            column,
            is_key: property.is_key,
        });
    }

    let keys: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.is_key)
        .map(|(index, _)| index)
        .collect();
    let key_index = match keys.as_slice() {
        [single] => *single,
        [] => {
            return Err(MetadataError::MissingKey {
                entity: entity_name,
            })
        }
        _ => {
            return Err(MetadataError::MultipleKeys {
                entity: entity_name,
                keys: keys
                    .iter()
                    .map(|index| columns[*index].property.clone())
                    .collect(),
            })
        }
    };

    Ok(EntityMeta {
        entity: entity_name,
        table,
        columns,
        key_index,
    })
}

/// Last path segment of the Rust type name, without generic arguments.
fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

#[cfg(test)]
mod tests {
    use super::{metadata_for, resolve, short_type_name, MetadataError};
    use crate::db::NamedParams;
    use crate::model::entity::{Entity, EntityDescriptor, FromRow};
    use rusqlite::Row;
    use std::sync::Arc;

    struct Widget;

    impl FromRow for Widget {
        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Widget)
        }
    }

    impl Entity for Widget {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new().key("Id").property_as("Label", "LABEL")
        }

        fn to_params(&self) -> NamedParams {
            NamedParams::new()
        }
    }

    #[test]
    fn table_defaults_to_type_name_and_columns_to_property_names() {
        let meta = metadata_for::<Widget>().unwrap();
        assert_eq!(meta.table(), "Widget");
        assert_eq!(meta.key().property, "Id");
        assert_eq!(meta.key().column, "Id");
        let non_key: Vec<_> = meta.non_key_columns().map(|c| c.column.as_str()).collect();
        assert_eq!(non_key, vec!["LABEL"]);
    }

    #[test]
    fn resolution_is_memoized_per_type() {
        let first = metadata_for::<Widget>().unwrap();
        let second = metadata_for::<Widget>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn explicit_table_override_wins() {
        let meta = resolve(
            "Person",
            &EntityDescriptor::new().table("hr.PEOPLE").key_as("Id", "ID"),
        )
        .unwrap();
        assert_eq!(meta.table(), "hr.PEOPLE");
        assert_eq!(meta.entity(), "Person");
    }

    #[test]
    fn missing_and_multiple_keys_fail_fast() {
        let missing = resolve("Person", &EntityDescriptor::new().property("Name")).unwrap_err();
        assert!(matches!(missing, MetadataError::MissingKey { .. }));

        let multiple = resolve(
            "Person",
            &EntityDescriptor::new().key("Id").key("Code").property("Name"),
        )
        .unwrap_err();
        assert_eq!(
            multiple,
            MetadataError::MultipleKeys {
                entity: "Person".to_string(),
                keys: vec!["Id".to_string(), "Code".to_string()],
            }
        );
    }

    #[test]
    fn duplicate_and_invalid_identifiers_are_rejected() {
        assert!(matches!(
            resolve("P", &EntityDescriptor::new().key("Id").property_as("Name", "ID")),
            Err(MetadataError::DuplicateColumn { .. })
        ));
        assert!(matches!(
            resolve("P", &EntityDescriptor::new().key("Id").property("id")),
            Err(MetadataError::DuplicateProperty { .. })
        ));
        assert!(matches!(
            resolve("P", &EntityDescriptor::new().key("Id").property_as("Name", "NAME; --")),
            Err(MetadataError::InvalidIdentifier { identifier, .. }) if identifier == "NAME; --"
        ));
        assert!(matches!(
            resolve("P", &EntityDescriptor::new().table("a b").key("Id")),
            Err(MetadataError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            resolve("P", &EntityDescriptor::new()),
            Err(MetadataError::NoProperties { .. })
        ));
    }

    #[test]
    fn short_type_name_strips_path_and_generics() {
        assert_eq!(short_type_name::<Widget>(), "Widget");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
    }
}
