//! Narrow repository capabilities and their compositions.
//!
//! Each trait declares one operation. Consumers bound on the smallest set
//! they call, which is what lets the in-memory and SQLite engines stand in
//! for each other behind a unit of work.
//!
//! # Invariants
//! - Every capability extends `Transactional`, so anything that can serve
//!   data can also join a unit of work.
//! - Compositions (`ReadOnlyRepository`, `WriteOnlyRepository`,
//!   `CrudRepository`) are blanket-implemented; never implement them by hand.

use super::{Filter, RepoResult};
use crate::model::Key;
use serde_json::Value;

/// Transaction contract shared by every repository.
pub trait Transactional {
    /// Starts a transaction. Must be a no-op when one is already open.
    fn begin(&mut self) -> RepoResult<()>;
    fn commit(&mut self) -> RepoResult<()>;
    fn rollback(&mut self) -> RepoResult<()>;
    fn in_transaction(&self) -> bool;
}

impl<T: Transactional + ?Sized> Transactional for Box<T> {
    fn begin(&mut self) -> RepoResult<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> RepoResult<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> RepoResult<()> {
        (**self).rollback()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }
}

/// Fetch one entity by key; `ItemNotFound` when absent.
pub trait GetRepository<E>: Transactional {
    fn get(&self, id: &Key) -> RepoResult<E>;
}

/// Fetch every entity matching an exact-match filter, with the match count.
pub trait ListRepository<E>: Transactional {
    fn list(&self, filter: &Filter) -> RepoResult<(usize, Vec<E>)>;
}

/// Store a new entity built from a create DTO.
pub trait CreateRepository<E, C>: Transactional {
    fn create(&mut self, data: &C) -> RepoResult<E>;
}

/// Merge the set fields of an update DTO into an existing entity.
pub trait UpdateRepository<E, U>: Transactional {
    fn update(&mut self, id: &Key, data: &U) -> RepoResult<E>;
}

/// Remove an entity; `ItemNotFound` when absent.
pub trait DeleteRepository<E>: Transactional {
    fn delete(&mut self, id: &Key) -> RepoResult<()>;
}

/// Persist a whole entity under its own key.
pub trait SaveRepository<E>: Transactional {
    fn save(&mut self, entity: &E) -> RepoResult<E>;
}

pub trait ReadOnlyRepository<E>: GetRepository<E> + ListRepository<E> {}

impl<E, T> ReadOnlyRepository<E> for T where T: GetRepository<E> + ListRepository<E> {}

pub trait WriteOnlyRepository<E, C, U>:
    CreateRepository<E, C> + UpdateRepository<E, U> + DeleteRepository<E>
{
}

impl<E, C, U, T> WriteOnlyRepository<E, C, U> for T where
    T: CreateRepository<E, C> + UpdateRepository<E, U> + DeleteRepository<E>
{
}

pub trait CrudRepository<E, C, U>: ReadOnlyRepository<E> + WriteOnlyRepository<E, C, U> {}

impl<E, C, U, T> CrudRepository<E, C, U> for T where
    T: ReadOnlyRepository<E> + WriteOnlyRepository<E, C, U>
{
}

/// Type-erased lookup used to resolve foreign keys.
///
/// Renders the related entity as JSON so the owning repository can embed it
/// without knowing its type.
pub trait RelatedRepository {
    fn resolve(&self, id: &Key) -> RepoResult<Value>;
}
