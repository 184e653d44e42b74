//! Statement execution with named parameters and typed row decoding.
//!
//! # Responsibility
//! - Run SQL text against a borrowed connection.
//! - Decode rows through `FromRow` and scalars through `FromSql`.
//! - Serve composite queries as an ordered set of named result streams.
//!
//! # Invariants
//! - Statements run inside whatever transaction the connection currently has.
//! - Result streams of one composite query share a single savepoint, so they
//!   observe the same snapshot.

use super::{DbError, DbResult, NamedParams};
use crate::model::entity::FromRow;
use log::warn;
use rusqlite::types::FromSql;
use rusqlite::Connection;
use std::collections::VecDeque;

const COMPOSITE_SAVEPOINT: &str = "tablekit_composite";

/// Executes a non-query statement and returns the affected row count.
pub fn execute(conn: &Connection, sql: &str, params: &NamedParams) -> DbResult<usize> {
    let mut stmt = conn.prepare(sql)?;
    params.bind(&mut stmt)?;
    Ok(stmt.raw_execute()?)
}

/// Returns the first decoded row, or `None` when the query yields no rows.
pub fn query_first_or_default<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &NamedParams,
) -> DbResult<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    params.bind(&mut stmt)?;
    let mut rows = stmt.raw_query();
    match rows.next()? {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

/// Returns all decoded rows in statement order.
pub fn query<T: FromRow>(conn: &Connection, sql: &str, params: &NamedParams) -> DbResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    params.bind(&mut stmt)?;
    let mut rows = stmt.raw_query();
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(T::from_row(row)?);
    }
    Ok(items)
}

/// Returns the first column of the first row.
///
/// # Errors
/// - `rusqlite::Error::QueryReturnedNoRows` when the query yields no rows.
pub fn execute_scalar<T: FromSql>(
    conn: &Connection,
    sql: &str,
    params: &NamedParams,
) -> DbResult<T> {
    let mut stmt = conn.prepare(sql)?;
    params.bind(&mut stmt)?;
    let mut rows = stmt.raw_query();
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Err(rusqlite::Error::QueryReturnedNoRows.into()),
    }
}

/// Ordered list of named statements answered as separate result streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeQuery {
    cursors: Vec<(String, String)>,
}

impl CompositeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one result stream named `name` produced by `sql`.
    pub fn cursor(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.cursors.push((name.into(), sql.into()));
        self
    }

    pub fn cursor_names(&self) -> impl Iterator<Item = &str> {
        self.cursors.iter().map(|(name, _)| name.as_str())
    }

    pub fn sql(&self, name: &str) -> Option<&str> {
        self.cursors
            .iter()
            .find(|(cursor, _)| cursor == name)
            .map(|(_, sql)| sql.as_str())
    }
}

/// Opens a composite query; streams are consumed in declaration order.
///
/// A savepoint is held until the reader is finished or dropped.
pub fn query_multiple<'conn>(
    conn: &'conn Connection,
    query: CompositeQuery,
    params: NamedParams,
) -> DbResult<ResultSets<'conn>> {
    conn.execute_batch(&format!("SAVEPOINT {COMPOSITE_SAVEPOINT};"))?;
    Ok(ResultSets {
        conn,
        pending: query.cursors.into_iter().collect(),
        params,
        consumed: 0,
        open: true,
    })
}

/// Sequential reader over the result streams of a `CompositeQuery`.
pub struct ResultSets<'conn> {
    conn: &'conn Connection,
    pending: VecDeque<(String, String)>,
    params: NamedParams,
    consumed: usize,
    open: bool,
}

impl ResultSets<'_> {
    /// Name of the next unread stream.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pending.front().map(|(name, _)| name.as_str())
    }

    /// Reads the next stream as rows of `T`.
    pub fn read<T: FromRow>(&mut self) -> DbResult<Vec<T>> {
        let (_, sql) = self.take_next()?;
        query(self.conn, &sql, &self.params)
    }

    /// Reads the next stream as exactly one scalar value.
    pub fn read_single<T: FromSql>(&mut self) -> DbResult<T> {
        let (_, sql) = self.take_next()?;
        execute_scalar(self.conn, &sql, &self.params)
    }

    /// Releases the savepoint and reports any error doing so.
    pub fn finish(mut self) -> DbResult<()> {
        self.release()
    }

    fn take_next(&mut self) -> DbResult<(String, String)> {
        let next = self.pending.pop_front();
        self.consumed += 1;
        next.ok_or_else(|| DbError::MissingResultSet(format!("#{}", self.consumed)))
    }

    fn release(&mut self) -> DbResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {COMPOSITE_SAVEPOINT};"))?;
        Ok(())
    }
}

impl Drop for ResultSets<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("event=composite_release module=db status=error error={err}");
        }
    }
}
