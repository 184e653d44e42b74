//! Generic per-entity repository over a shared `TransactionContext`.
//!
//! # Responsibility
//! - Bind the statement builder to one entity type and execute through the
//!   context's connection.
//! - Serve row-numbered pages together with their total count.
//!
//! # Invariants
//! - The current transaction is read at call time, never captured at
//!   construction, so a repository obtained before `begin_transaction`
//!   still runs inside it.
//! - Execution errors propagate unchanged; there is no retry and no
//!   automatic rollback.
//! - Filter/order fragments are opaque SQL; callers bind values as params.

use crate::db::executor::{self, query_multiple};
use crate::db::{DbError, DbResult, NamedParams, TransactionContext};
use crate::model::entity::Entity;
use crate::model::metadata::{metadata_for, EntityMeta, MetadataError};
use crate::sql::builder::KEY_PARAM;
use crate::sql::{PageRequest, PagedStatement, StatementBuilder, StatementError};
use log::{debug, error};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Metadata(MetadataError),
    Statement(StatementError),
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metadata(err) => write!(f, "{err}"),
            Self::Statement(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Metadata(err) => Some(err),
            Self::Statement(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<MetadataError> for RepoError {
    fn from(value: MetadataError) -> Self {
        Self::Metadata(value)
    }
}

impl From<StatementError> for RepoError {
    fn from(value: StatementError) -> Self {
        Self::Statement(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One page of rows plus the count of all rows matching the filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows regardless of paging bounds.
    pub total_count: i64,
    pub page_index: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    /// Number of pages needed for `total_count` rows.
    pub fn page_count(&self) -> i64 {
        if self.page_size <= 0 || self.total_count <= 0 {
            return 0;
        }
        (self.total_count + self.page_size - 1) / self.page_size
    }
}

/// CRUD and paging operations for entity type `T`.
pub struct Repository<T: Entity> {
    ctx: Rc<TransactionContext>,
    meta: Arc<EntityMeta>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    /// Binds `T` to `ctx`, resolving its metadata.
    ///
    /// # Errors
    /// - `Metadata` when `T`'s declaration is unusable.
    pub fn new(ctx: Rc<TransactionContext>) -> RepoResult<Self> {
        Ok(Self {
            ctx,
            meta: metadata_for::<T>()?,
            _entity: PhantomData,
        })
    }

    pub fn metadata(&self) -> &EntityMeta {
        &self.meta
    }

    /// First row matching `filter`, if any.
    pub fn first_or_default(
        &self,
        filter: Option<&str>,
        params: &NamedParams,
    ) -> RepoResult<Option<T>> {
        let sql = self.builder().select(filter);
        self.run("first_or_default", |conn| {
            executor::query_first_or_default(conn, &sql, params)
        })
    }

    pub fn any(&self, filter: Option<&str>, params: &NamedParams) -> RepoResult<bool> {
        Ok(self.first_or_default(filter, params)?.is_some())
    }

    pub fn count(&self, filter: Option<&str>, params: &NamedParams) -> RepoResult<i64> {
        let sql = self.builder().count(filter);
        self.run("count", |conn| executor::execute_scalar(conn, &sql, params))
    }

    /// Row whose key column equals `id`.
    pub fn get_by_id(&self, id: impl Into<Value>) -> RepoResult<Option<T>> {
        let sql = self.builder().select_by_key();
        let params = NamedParams::new().with(KEY_PARAM, id);
        self.run("get_by_id", |conn| {
            executor::query_first_or_default(conn, &sql, &params)
        })
    }

    pub fn get(&self, filter: Option<&str>, params: &NamedParams) -> RepoResult<Vec<T>> {
        let sql = self.builder().select(filter);
        self.run("get", |conn| executor::query(conn, &sql, params))
    }

    pub fn get_all(&self) -> RepoResult<Vec<T>> {
        self.get(None, &NamedParams::new())
    }

    /// Inserts every column, key included; returns affected rows.
    pub fn add(&self, entity: &T) -> RepoResult<usize> {
        let sql = self.builder().insert();
        self.run("add", |conn| {
            executor::execute(conn, &sql, &entity.to_params())
        })
    }

    /// Updates non-key columns of the row matching the entity's key.
    ///
    /// Returns `0` when no row has that key.
    pub fn update(&self, entity: &T) -> RepoResult<usize> {
        let sql = self.builder().update()?;
        self.run("update", |conn| {
            executor::execute(conn, &sql, &entity.to_params())
        })
    }

    /// Deletes the row matching the entity's key.
    pub fn delete(&self, entity: &T) -> RepoResult<usize> {
        let sql = self.builder().delete_by_entity();
        self.run("delete", |conn| {
            executor::execute(conn, &sql, &entity.to_params())
        })
    }

    /// Deletes every row matching `filter`; `None` empties the table.
    pub fn delete_where(&self, filter: Option<&str>, params: &NamedParams) -> RepoResult<usize> {
        let sql = self.builder().delete_by_filter(filter);
        self.run("delete_where", |conn| executor::execute(conn, &sql, params))
    }

    /// Page request pre-filled with this entity's select list and table.
    pub fn page_request(&self, page_index: i64, page_size: i64) -> PageRequest {
        PageRequest::new(
            self.builder().select_list(),
            self.meta.table(),
            page_index,
            page_size,
        )
    }

    /// Runs the page and count statements against one snapshot.
    ///
    /// # Errors
    /// - `Statement(InvalidPageSize)` when `request.page_size <= 0`.
    pub fn get_paged(&self, request: &PageRequest) -> RepoResult<Page<T>> {
        let statement = PagedStatement::build(request)?;

        let (items, total_count) = self.run_described(
            "get_paged",
            |conn| {
                let mut sets = query_multiple(
                    conn,
                    statement.composite(),
                    statement.bind_params(&request.params),
                )?;
                let items: Vec<T> = sets.read()?;
                let total: i64 = sets.read_single()?;
                sets.finish()?;
                Ok((items, total))
            },
            |(items, total): &(Vec<T>, i64)| {
                format!(
                    " page_index={} page_size={} rows={} total={total}",
                    request.page_index,
                    request.page_size,
                    items.len()
                )
            },
        )?;

        Ok(Page {
            items,
            total_count,
            page_index: request.page_index,
            page_size: request.page_size,
        })
    }

    fn builder(&self) -> StatementBuilder<'_> {
        StatementBuilder::new(&self.meta)
    }

    fn run<R>(&self, op: &str, f: impl FnOnce(&Connection) -> DbResult<R>) -> RepoResult<R> {
        self.run_described(op, f, |_| String::new())
    }

    /// Runs `f` and logs one `repo_exec` event; `describe` appends
    /// operation-specific fields to the success line.
    fn run_described<R>(
        &self,
        op: &str,
        f: impl FnOnce(&Connection) -> DbResult<R>,
        describe: impl FnOnce(&R) -> String,
    ) -> RepoResult<R> {
        let started_at = Instant::now();
        let in_tx = self.ctx.in_transaction();
        let conn = self.ctx.connection()?;

        match f(&*conn) {
            Ok(value) => {
                debug!(
                    "event=repo_exec module=repo status=ok op={op} entity={} in_tx={in_tx} duration_ms={}{}",
                    self.meta.entity(),
                    started_at.elapsed().as_millis(),
                    describe(&value)
                );
                Ok(value)
            }
            Err(err) => {
                error!(
                    "event=repo_exec module=repo status=error op={op} entity={} in_tx={in_tx} duration_ms={} error={err}",
                    self.meta.entity(),
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Page;

    #[test]
    fn page_count_rounds_up() {
        let page: Page<()> = Page {
            items: vec![],
            total_count: 25,
            page_index: 1,
            page_size: 10,
        };
        assert_eq!(page.page_count(), 3);

        let empty: Page<()> = Page {
            total_count: 0,
            ..page
        };
        assert_eq!(empty.page_count(), 0);
    }
}
