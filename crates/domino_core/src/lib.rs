//! Repository, unit-of-work and service scaffolding.
//!
//! Domain code talks to narrow repository capabilities; a unit of work
//! groups the repositories of one business operation and commits or rolls
//! them back together. Two engines implement the capabilities: an in-memory
//! key-value store with foreign-key resolution (`repo::kv`) and a
//! table-mapped SQLite adapter (`repo::sql`). `repo::queue` is an in-memory
//! topic queue that can join the same units of work.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod rule;
pub mod service;
pub mod uow;

pub use db::{DatabaseConfig, DbError, DbResult, Session};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::{Aggregate, Entity, Key, ModelError, Patch, Record, ValueObject};
pub use repo::kv::{KvRepository, KvRepositoryBuilder};
pub use repo::queue::{InMemoryQueue, QueueMessage};
pub use repo::sql::SqlRepository;
pub use repo::{
    CreateRepository, CrudRepository, DeleteRepository, Filter, GetRepository, ListRepository,
    ReadOnlyRepository, RelatedRepository, RepoError, RepoResult, SaveRepository, Transactional,
    UpdateRepository, WriteOnlyRepository,
};
pub use rule::{check_rule, BusinessRule, BusinessRuleViolation, RuleId};
pub use service::{Service, ServiceError, ServiceResult};
pub use uow::{Component, RepositorySet, UnitOfWork, UnitOfWorkError, UowState};

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
