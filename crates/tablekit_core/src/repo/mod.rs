//! Repository layer over the shared transaction context.
//!
//! # Responsibility
//! - Expose the fixed CRUD/paging operation set for any `Entity`.
//! - Keep one repository per entity type inside a unit of work.
//!
//! # Invariants
//! - Repositories never own connections; they borrow the context's one.
//! - Repository APIs surface execution errors unchanged.

pub mod generic_repo;
pub mod unit_of_work;
