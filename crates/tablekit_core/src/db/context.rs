//! Single connection/transaction owner shared by repositories.
//!
//! # Responsibility
//! - Open the connection lazily on first use and reopen it after a close.
//! - Track the one active transaction and end it on commit/rollback.
//! - Release everything on dispose, exactly once.
//!
//! # Invariants
//! - At most one transaction is active; a second begin is rejected.
//! - Commit/rollback without an active transaction are no-ops.
//! - After dispose every operation returns `DbError::Disposed`.
//! - The context is single-threaded (`!Sync`); overlapping callers must use
//!   separate contexts.

use super::{open_connection, DbError, DbResult};
use crate::config::ConnectionOptions;
use log::{error, info, warn};
use rusqlite::Connection;
use std::cell::{Cell, Ref, RefCell};
use std::time::Instant;
use uuid::Uuid;

/// Locking mode used when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeginMode {
    /// Locks are taken on first read/write.
    #[default]
    Deferred,
    /// Takes the write lock immediately.
    Immediate,
    /// Excludes other readers and writers.
    Exclusive,
}

impl BeginMode {
    fn begin_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED;",
            Self::Immediate => "BEGIN IMMEDIATE;",
            Self::Exclusive => "BEGIN EXCLUSIVE;",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Deferred => "deferred",
            Self::Immediate => "immediate",
            Self::Exclusive => "exclusive",
        }
    }
}

/// Descriptor of the currently active transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    /// Correlation id used in log events.
    pub id: Uuid,
    pub mode: BeginMode,
    pub started_at: Instant,
}

pub struct TransactionContext {
    options: ConnectionOptions,
    connection: RefCell<Option<Connection>>,
    transaction: RefCell<Option<TransactionHandle>>,
    disposed: Cell<bool>,
}

impl TransactionContext {
    /// Creates a context; no connection is opened until first use.
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            connection: RefCell::new(None),
            transaction: RefCell::new(None),
            disposed: Cell::new(false),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Returns the connection, opening it when none is held.
    ///
    /// The returned guard must be dropped before closing or disposing.
    pub fn connection(&self) -> DbResult<Ref<'_, Connection>> {
        self.ensure_open()?;
        Ref::filter_map(self.connection.borrow(), Option::as_ref).map_err(|_| DbError::Disposed)
    }

    pub fn is_open(&self) -> bool {
        self.connection.borrow().is_some()
    }

    /// Closes the held connection; the next `connection()` call reopens.
    ///
    /// # Errors
    /// - `TransactionInProgress` while a transaction is active.
    /// - `ConnectionInUse` while a `connection()` guard is alive.
    pub fn close_connection(&self) -> DbResult<()> {
        self.ensure_not_disposed()?;
        if self.in_transaction() {
            return Err(DbError::TransactionInProgress);
        }
        let taken = self
            .connection
            .try_borrow_mut()
            .map_err(|_| DbError::ConnectionInUse)?
            .take();
        match taken {
            Some(conn) => close(conn),
            None => Ok(()),
        }
    }

    /// Begins a deferred transaction.
    pub fn begin_transaction(&self) -> DbResult<()> {
        self.begin_transaction_with(BeginMode::Deferred)
    }

    /// Begins a transaction with an explicit locking mode.
    ///
    /// # Errors
    /// - `TransactionAlreadyActive` when one is already open; the active
    ///   transaction is left untouched.
    pub fn begin_transaction_with(&self, mode: BeginMode) -> DbResult<()> {
        self.ensure_not_disposed()?;
        if self.in_transaction() {
            warn!("event=tx_begin module=db status=rejected reason=already_active");
            return Err(DbError::TransactionAlreadyActive);
        }

        let conn = self.connection()?;
        conn.execute_batch(mode.begin_sql())?;
        let handle = TransactionHandle {
            id: Uuid::new_v4(),
            mode,
            started_at: Instant::now(),
        };
        info!(
            "event=tx_begin module=db status=ok tx_id={} mode={}",
            handle.id,
            mode.as_str()
        );
        *self.transaction.borrow_mut() = Some(handle);
        Ok(())
    }

    /// Commits the active transaction; no-op without one.
    pub fn commit(&self) -> DbResult<()> {
        self.finish_transaction("COMMIT;", "tx_commit")
    }

    /// Rolls back the active transaction; no-op without one.
    pub fn rollback(&self) -> DbResult<()> {
        self.finish_transaction("ROLLBACK;", "tx_rollback")
    }

    /// Returns a copy of the active transaction descriptor.
    pub fn transaction(&self) -> Option<TransactionHandle> {
        self.transaction.borrow().clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.borrow().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Rolls back any active transaction and closes the connection.
    ///
    /// Idempotent. Cleanup continues past failures; the first failure is
    /// returned once everything has been released.
    pub fn dispose(&self) -> DbResult<()> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        let taken = match self.connection.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                self.disposed.set(false);
                return Err(DbError::ConnectionInUse);
            }
        };
        let active = self.transaction.borrow_mut().take();
        let mut first_error = None;

        if let Some(conn) = taken {
            if let Some(handle) = active {
                if !conn.is_autocommit() {
                    if let Err(err) = conn.execute_batch("ROLLBACK;") {
                        error!(
                            "event=tx_rollback module=db status=error tx_id={} reason=dispose error={err}",
                            handle.id
                        );
                        first_error = Some(DbError::from(err));
                    }
                }
            }
            if let Err(err) = close(conn) {
                first_error.get_or_insert(err);
            }
        }

        info!("event=ctx_dispose module=db status=ok");
        first_error.map_or(Ok(()), Err)
    }

    fn finish_transaction(&self, sql: &str, event: &str) -> DbResult<()> {
        self.ensure_not_disposed()?;
        let Some(handle) = self.transaction.borrow_mut().take() else {
            return Ok(());
        };

        let conn = self.connection()?;
        if let Err(err) = conn.execute_batch(sql) {
            // SQLite may already have rolled back on its own; only a still-open
            // transaction stays registered.
            if !conn.is_autocommit() {
                *self.transaction.borrow_mut() = Some(handle.clone());
            }
            error!(
                "event={event} module=db status=error tx_id={} error={err}",
                handle.id
            );
            return Err(err.into());
        }

        info!(
            "event={event} module=db status=ok tx_id={} duration_ms={}",
            handle.id,
            handle.started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn ensure_open(&self) -> DbResult<()> {
        self.ensure_not_disposed()?;
        if self.connection.borrow().is_some() {
            return Ok(());
        }
        let conn = open_connection(&self.options)?;
        *self
            .connection
            .try_borrow_mut()
            .map_err(|_| DbError::ConnectionInUse)? = Some(conn);
        Ok(())
    }

    fn ensure_not_disposed(&self) -> DbResult<()> {
        if self.disposed.get() {
            return Err(DbError::Disposed);
        }
        Ok(())
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("event=ctx_dispose module=db status=error error={err}");
        }
    }
}

fn close(conn: Connection) -> DbResult<()> {
    match conn.close() {
        Ok(()) => {
            info!("event=db_close module=db status=ok");
            Ok(())
        }
        Err((_conn, err)) => {
            error!("event=db_close module=db status=error error={err}");
            Err(err.into())
        }
    }
}
