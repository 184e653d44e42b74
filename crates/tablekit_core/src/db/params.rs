//! Named parameter bag bound by `:name` placeholders.
//!
//! # Invariants
//! - Names are stored without their marker (`:Id` and `Id` are the same key).
//! - Every named placeholder of a statement must have a value when bound.
//! - Values without a matching placeholder are ignored.

use super::{DbError, DbResult};
use rusqlite::types::Value;
use rusqlite::Statement;
use std::collections::BTreeMap;

const PARAM_MARKERS: [char; 3] = [':', '@', '$'];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams {
    values: BTreeMap<String, Value>,
}

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces one value.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(normalize(name).to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(normalize(name))
    }

    /// Copies all values of `other` into `self`, replacing duplicates.
    pub fn merge(&mut self, other: &NamedParams) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Binds values to every placeholder declared by `stmt`.
    ///
    /// # Errors
    /// - `MissingParameter` when a placeholder has no value or is positional.
    pub(crate) fn bind(&self, stmt: &mut Statement<'_>) -> DbResult<()> {
        let placeholders: Vec<(usize, String)> = (1..=stmt.parameter_count())
            .map(|index| {
                let name = stmt
                    .parameter_name(index)
                    .map_or_else(|| format!("?{index}"), str::to_string);
                (index, name)
            })
            .collect();

        for (index, placeholder) in placeholders {
            let value = if placeholder.starts_with('?') {
                None
            } else {
                self.get(&placeholder)
            };
            match value {
                Some(value) => stmt.raw_bind_parameter(index, value)?,
                None => return Err(DbError::MissingParameter(placeholder)),
            }
        }
        Ok(())
    }
}

impl<N: AsRef<str>, V: Into<Value>> FromIterator<(N, V)> for NamedParams {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name.as_ref(), value);
        }
        params
    }
}

fn normalize(name: &str) -> &str {
    name.trim().trim_start_matches(PARAM_MARKERS)
}

#[cfg(test)]
mod tests {
    use super::NamedParams;
    use crate::db::DbError;
    use rusqlite::types::Value;
    use rusqlite::Connection;

    #[test]
    fn marker_prefix_is_ignored_for_lookup() {
        let params = NamedParams::new().with(":Id", 7_i64);
        assert_eq!(params.get("Id"), Some(&Value::Integer(7)));
        assert_eq!(params.get("@Id"), Some(&Value::Integer(7)));
    }

    #[test]
    fn merge_replaces_existing_values() {
        let mut base = NamedParams::new().with("a", 1_i64).with("b", 2_i64);
        base.merge(&NamedParams::new().with("b", 3_i64));
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("b"), Some(&Value::Integer(3)));
    }

    #[test]
    fn bind_reports_missing_placeholder_values() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT :a + :b").unwrap();

        let err = NamedParams::new()
            .with("a", 1_i64)
            .bind(&mut stmt)
            .unwrap_err();
        assert!(matches!(err, DbError::MissingParameter(name) if name == ":b"));
    }

    #[test]
    fn bind_rejects_positional_placeholders() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?").unwrap();

        let err = NamedParams::new().bind(&mut stmt).unwrap_err();
        assert!(matches!(err, DbError::MissingParameter(name) if name == "?1"));
    }
}
