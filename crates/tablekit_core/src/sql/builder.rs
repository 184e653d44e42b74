//! SQL text generation from resolved entity metadata.
//!
//! # Responsibility
//! - Compose SELECT/COUNT/INSERT/UPDATE/DELETE statements for one entity.
//!
//! # Invariants
//! - Identifiers come only from `EntityMeta`.
//! - Filter fragments are appended verbatim after `WHERE`; blank fragments
//!   are treated as absent. Callers must bind values through parameters.
//! - Values are always referenced as `:<property>` placeholders.

use super::{where_clause, StatementError};
use crate::model::metadata::EntityMeta;

/// Placeholder name used by `select_by_key`.
pub const KEY_PARAM: &str = "Id";

pub struct StatementBuilder<'m> {
    meta: &'m EntityMeta,
}

impl<'m> StatementBuilder<'m> {
    pub fn new(meta: &'m EntityMeta) -> Self {
        Self { meta }
    }

    /// `SELECT <col AS prop,...> FROM <table> [WHERE <filter>]`
    pub fn select(&self, filter: Option<&str>) -> String {
        format!(
            "SELECT {} FROM {}{}",
            self.select_list(),
            self.meta.table(),
            where_clause(filter)
        )
    }

    /// `SELECT COUNT(*) FROM <table> [WHERE <filter>]`
    pub fn count(&self, filter: Option<&str>) -> String {
        format!(
            "SELECT COUNT(*) FROM {}{}",
            self.meta.table(),
            where_clause(filter)
        )
    }

    /// Select by key value bound to `:Id`.
    pub fn select_by_key(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = :{KEY_PARAM}",
            self.select_list(),
            self.meta.table(),
            self.meta.key().column
        )
    }

    /// Insert over every column, key included.
    pub fn insert(&self) -> String {
        let columns = self.meta.columns();
        let names: Vec<&str> = columns.iter().map(|c| c.column.as_str()).collect();
        let values: Vec<String> = columns.iter().map(|c| format!(":{}", c.property)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.meta.table(),
            names.join(", "),
            values.join(", ")
        )
    }

    /// Update of every non-key column, matched on the key.
    ///
    /// # Errors
    /// - `NoUpdatableColumns` when the entity only has its key column.
    pub fn update(&self) -> Result<String, StatementError> {
        let assignments: Vec<String> = self
            .meta
            .non_key_columns()
            .map(|c| format!("{} = :{}", c.column, c.property))
            .collect();
        if assignments.is_empty() {
            return Err(StatementError::NoUpdatableColumns {
                entity: self.meta.entity().to_string(),
            });
        }

        let key = self.meta.key();
        Ok(format!(
            "UPDATE {} SET {} WHERE {} = :{}",
            self.meta.table(),
            assignments.join(", "),
            key.column,
            key.property
        ))
    }

    /// Delete the row whose key matches the entity's key property.
    pub fn delete_by_entity(&self) -> String {
        let key = self.meta.key();
        format!(
            "DELETE FROM {} WHERE {} = :{}",
            self.meta.table(),
            key.column,
            key.property
        )
    }

    /// `DELETE FROM <table> [WHERE <filter>]`; no filter deletes every row.
    pub fn delete_by_filter(&self, filter: Option<&str>) -> String {
        format!("DELETE FROM {}{}", self.meta.table(), where_clause(filter))
    }

    /// Comma-separated `column AS property` list in declaration order.
    pub fn select_list(&self) -> String {
        self.meta
            .columns()
            .iter()
            .map(|c| {
                if c.column == c.property {
                    c.column.clone()
                } else {
                    format!("{} AS {}", c.column, c.property)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::StatementBuilder;
    use crate::model::entity::EntityDescriptor;
    use crate::model::metadata::{resolve, EntityMeta};
    use crate::sql::StatementError;

    fn person() -> EntityMeta {
        resolve(
            "Person",
            &EntityDescriptor::new()
                .table("PEOPLE")
                .key_as("Id", "ID")
                .property_as("Name", "NAME")
                .property("Age"),
        )
        .unwrap()
    }

    #[test]
    fn select_aliases_renamed_columns_only() {
        let meta = person();
        let builder = StatementBuilder::new(&meta);
        assert_eq!(
            builder.select(None),
            "SELECT ID AS Id, NAME AS Name, Age FROM PEOPLE"
        );
        assert_eq!(
            builder.select(Some("Age > :min")),
            "SELECT ID AS Id, NAME AS Name, Age FROM PEOPLE WHERE Age > :min"
        );
    }

    #[test]
    fn blank_filter_is_ignored() {
        let meta = person();
        let builder = StatementBuilder::new(&meta);
        assert_eq!(builder.count(Some("   ")), "SELECT COUNT(*) FROM PEOPLE");
        assert_eq!(builder.delete_by_filter(Some("")), "DELETE FROM PEOPLE");
    }

    #[test]
    fn key_statements_use_key_column_and_property() {
        let meta = person();
        let builder = StatementBuilder::new(&meta);
        assert_eq!(
            builder.select_by_key(),
            "SELECT ID AS Id, NAME AS Name, Age FROM PEOPLE WHERE ID = :Id"
        );
        assert_eq!(
            builder.delete_by_entity(),
            "DELETE FROM PEOPLE WHERE ID = :Id"
        );
    }

    #[test]
    fn insert_covers_every_column_and_update_skips_key() {
        let meta = person();
        let builder = StatementBuilder::new(&meta);
        assert_eq!(
            builder.insert(),
            "INSERT INTO PEOPLE (ID, NAME, Age) VALUES (:Id, :Name, :Age)"
        );
        assert_eq!(
            builder.update().unwrap(),
            "UPDATE PEOPLE SET NAME = :Name, Age = :Age WHERE ID = :Id"
        );
    }

    #[test]
    fn update_without_non_key_columns_is_rejected() {
        let meta = resolve("Tag", &EntityDescriptor::new().key("Code")).unwrap();
        let err = StatementBuilder::new(&meta).update().unwrap_err();
        assert_eq!(
            err,
            StatementError::NoUpdatableColumns {
                entity: "Tag".to_string()
            }
        );
    }
}
