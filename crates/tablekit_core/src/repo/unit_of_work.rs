//! Unit of work: one repository per entity type over one context.
//!
//! # Responsibility
//! - Cache exactly one `Repository<T>` per entity type.
//! - Forward transaction control to the owned `TransactionContext`.
//!
//! # Invariants
//! - Cache entries are keyed by `TypeId`, so equally named types in
//!   different modules never collide.
//! - The context is disposed at most once, on `dispose()` or drop.
//! - Transaction state machine: none -> begin -> active -> commit|rollback
//!   -> none. Commit/rollback with no transaction are no-ops; begin while
//!   active is rejected.

use super::generic_repo::{RepoResult, Repository};
use crate::config::ConnectionOptions;
use crate::db::{BeginMode, DbError, DbResult, TransactionContext};
use crate::model::entity::Entity;
use log::{debug, error, warn};
use rusqlite::Connection;
use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

pub struct UnitOfWork {
    ctx: Rc<TransactionContext>,
    repositories: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    disposed: Cell<bool>,
}

impl UnitOfWork {
    /// Creates a unit of work owning a fresh, not yet opened context.
    pub fn new(options: ConnectionOptions) -> Self {
        Self::with_context(Rc::new(TransactionContext::new(options)))
    }

    pub fn with_context(ctx: Rc<TransactionContext>) -> Self {
        Self {
            ctx,
            repositories: RefCell::new(HashMap::new()),
            disposed: Cell::new(false),
        }
    }

    pub fn context(&self) -> &Rc<TransactionContext> {
        &self.ctx
    }

    /// Direct access to the shared connection.
    pub fn connection(&self) -> DbResult<Ref<'_, Connection>> {
        self.ctx.connection()
    }

    /// Returns the repository for `T`, creating it on first request.
    ///
    /// # Errors
    /// - `Metadata` when `T`'s declaration is unusable (nothing is cached).
    /// - `Db(Disposed)` after `dispose()`.
    pub fn repository<T: Entity>(&self) -> RepoResult<Rc<Repository<T>>> {
        if self.disposed.get() {
            return Err(DbError::Disposed.into());
        }

        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.repositories.borrow().get(&type_id) {
            if let Ok(repo) = Rc::clone(existing).downcast::<Repository<T>>() {
                return Ok(repo);
            }
        }

        let repo = Rc::new(Repository::<T>::new(Rc::clone(&self.ctx))?);
        debug!(
            "event=repo_register module=repo status=ok entity={} table={}",
            repo.metadata().entity(),
            repo.metadata().table()
        );
        self.repositories
            .borrow_mut()
            .insert(type_id, Rc::clone(&repo) as Rc<dyn Any>);
        Ok(repo)
    }

    /// Number of cached repositories.
    pub fn repository_count(&self) -> usize {
        self.repositories.borrow().len()
    }

    pub fn begin_transaction(&self) -> DbResult<()> {
        self.ctx.begin_transaction()
    }

    pub fn begin_transaction_with(&self, mode: BeginMode) -> DbResult<()> {
        self.ctx.begin_transaction_with(mode)
    }

    pub fn commit(&self) -> DbResult<()> {
        self.ctx.commit()
    }

    pub fn rollback(&self) -> DbResult<()> {
        self.ctx.rollback()
    }

    pub fn in_transaction(&self) -> bool {
        self.ctx.in_transaction()
    }

    /// Runs `work` in a transaction: commit on `Ok`, rollback on `Err`.
    ///
    /// A rollback failure is logged; the error from `work` is returned.
    pub fn transaction_scope<R, E>(&self, work: impl FnOnce(&Self) -> Result<R, E>) -> Result<R, E>
    where
        E: From<DbError>,
    {
        self.begin_transaction()?;
        match work(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    error!(
                        "event=tx_scope module=repo status=error stage=rollback error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }

    /// Disposes the context and drops cached repositories; idempotent.
    ///
    /// # Errors
    /// - `ConnectionInUse` while a `connection()` guard is alive; nothing is
    ///   released and a later call retries.
    /// - Rollback/close failures; the unit of work is disposed regardless.
    pub fn dispose(&self) -> DbResult<()> {
        if self.disposed.get() {
            return Ok(());
        }
        let result = self.ctx.dispose();
        if matches!(result, Err(DbError::ConnectionInUse)) {
            return result;
        }
        self.disposed.set(true);
        self.repositories.borrow_mut().clear();
        result
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("event=uow_dispose module=repo status=error error={err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UnitOfWork;
    use crate::config::ConnectionOptions;
    use crate::db::{DbError, NamedParams};
    use crate::model::entity::{Entity, EntityDescriptor, FromRow};
    use crate::repo::generic_repo::RepoError;
    use rusqlite::Row;
    use std::rc::Rc;

    struct Gadget;

    impl FromRow for Gadget {
        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Gadget)
        }
    }

    impl Entity for Gadget {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new().key("Id").property("Label")
        }

        fn to_params(&self) -> NamedParams {
            NamedParams::new()
        }
    }

    struct Keyless;

    impl FromRow for Keyless {
        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Keyless)
        }
    }

    impl Entity for Keyless {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new().property("Label")
        }

        fn to_params(&self) -> NamedParams {
            NamedParams::new()
        }
    }

    #[test]
    fn repository_is_cached_per_type() {
        let uow = UnitOfWork::new(ConnectionOptions::in_memory());
        let first = uow.repository::<Gadget>().unwrap();
        let second = uow.repository::<Gadget>().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(uow.repository_count(), 1);
    }

    #[test]
    fn invalid_entity_is_not_cached() {
        let uow = UnitOfWork::new(ConnectionOptions::in_memory());
        assert!(matches!(
            uow.repository::<Keyless>(),
            Err(RepoError::Metadata(_))
        ));
        assert_eq!(uow.repository_count(), 0);
    }

    #[test]
    fn dispose_is_idempotent_and_disables_repositories() {
        let uow = UnitOfWork::new(ConnectionOptions::in_memory());
        uow.connection().unwrap();
        uow.dispose().unwrap();
        uow.dispose().unwrap();

        assert!(uow.context().is_disposed());
        assert!(matches!(
            uow.repository::<Gadget>(),
            Err(RepoError::Db(DbError::Disposed))
        ));
    }

    #[test]
    fn dispose_blocked_by_live_connection_can_be_retried() {
        let uow = UnitOfWork::new(ConnectionOptions::in_memory());
        uow.begin_transaction().unwrap();

        let guard = uow.connection().unwrap();
        assert!(matches!(uow.dispose(), Err(DbError::ConnectionInUse)));
        assert!(!uow.context().is_disposed());
        assert!(uow.in_transaction());
        drop(guard);

        uow.dispose().unwrap();
        assert!(uow.context().is_disposed());
        assert!(!uow.in_transaction());
        assert!(!uow.context().is_open());
    }

    #[test]
    fn transaction_scope_rolls_back_on_error() {
        let uow = UnitOfWork::new(ConnectionOptions::in_memory());
        uow.connection()
            .unwrap()
            .execute_batch("CREATE TABLE Gadget (Id INTEGER PRIMARY KEY, Label TEXT);")
            .unwrap();

        let result: Result<(), RepoError> = uow.transaction_scope(|scope| {
            scope
                .connection()?
                .execute_batch("INSERT INTO Gadget (Id, Label) VALUES (1, 'a');")
                .map_err(DbError::from)?;
            Err(DbError::MissingParameter("boom".to_string()).into())
        });
        assert!(result.is_err());
        assert!(!uow.in_transaction());

        let repo = uow.repository::<Gadget>().unwrap();
        assert_eq!(repo.count(None, &NamedParams::new()).unwrap(), 0);
    }
}
