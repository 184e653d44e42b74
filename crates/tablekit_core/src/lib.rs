//! Generic table repositories for SQLite.
//! Entity metadata drives SQL generation; one context owns the connection
//! and its transaction.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod sql;

pub use config::{ConfigError, ConnectionOptions};
pub use db::{BeginMode, DbError, DbResult, NamedParams, TransactionContext, TransactionHandle};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{Entity, EntityDescriptor, FromRow, PropertyDescriptor};
pub use model::metadata::{metadata_for, ColumnMeta, EntityMeta, MetadataError};
pub use repo::generic_repo::{Page, RepoError, RepoResult, Repository};
pub use repo::unit_of_work::UnitOfWork;
pub use sql::{PageRequest, PagedStatement, StatementBuilder, StatementError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
