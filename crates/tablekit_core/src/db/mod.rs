//! Connection, transaction and statement execution primitives.
//!
//! # Responsibility
//! - Open and configure SQLite connections from `ConnectionOptions`.
//! - Own the single connection/transaction slot shared by repositories.
//! - Execute SQL text with `:name` parameters and decode typed rows.
//!
//! # Invariants
//! - At most one transaction is active per `TransactionContext`.
//! - Driver errors are surfaced unchanged inside `DbError::Sqlite`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod context;
pub mod executor;
mod open;
pub mod params;

pub use context::{BeginMode, TransactionContext, TransactionHandle};
pub use open::open_connection;
pub use params::NamedParams;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A named placeholder in the statement has no bound value.
    MissingParameter(String),
    TransactionAlreadyActive,
    /// Closing the connection was requested while a transaction is open.
    TransactionInProgress,
    /// The connection slot is borrowed by a live `connection()` guard.
    ConnectionInUse,
    Disposed,
    /// A composite query was read past its last result set.
    MissingResultSet(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::MissingParameter(name) => write!(f, "no value bound for parameter `{name}`"),
            Self::TransactionAlreadyActive => {
                write!(f, "a transaction is already active on this context")
            }
            Self::TransactionInProgress => {
                write!(f, "cannot close the connection while a transaction is active")
            }
            Self::ConnectionInUse => write!(f, "connection is still borrowed by a caller"),
            Self::Disposed => write!(f, "transaction context has been disposed"),
            Self::MissingResultSet(name) => write!(f, "result set `{name}` was not produced"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
