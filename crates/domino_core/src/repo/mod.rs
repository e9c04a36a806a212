//! Repository layer abstractions and persistence adapters.
//!
//! # Responsibility
//! - Define narrow, composable data access capabilities.
//! - Provide an in-memory engine (`kv`) and a SQLite engine (`sql`) that honor
//!   the same capability contracts, so either can back a unit of work.
//!
//! # Invariants
//! - Identifiers are canonicalized to `Key` at the boundary.
//! - `get`/`update`/`delete` on a missing key fail with `ItemNotFound`.
//! - A failed operation leaves no partial state behind.

pub mod capability;
pub mod kv;
pub mod queue;
pub mod sql;

pub use capability::{
    CreateRepository, CrudRepository, DeleteRepository, GetRepository, ListRepository,
    ReadOnlyRepository, RelatedRepository, SaveRepository, Transactional, UpdateRepository,
    WriteOnlyRepository,
};

use crate::db::DbError;
use crate::model::{Key, ModelError, Record};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for repository persistence, query and configuration failures.
#[derive(Debug)]
pub enum RepoError {
    /// No record is stored under the key.
    ItemNotFound(Key),
    /// Repository was built without a primary-key property.
    PrimaryKeyPropertyNotDefined,
    /// Entity handed to `save` carries no usable primary key.
    MissingPrimaryKey(String),
    /// Explicit key on `create` is already taken.
    DuplicateKey(Key),
    /// Record does not fit the entity/DTO shape.
    InvalidData(String),
    /// Message produced to a topic the queue was not configured with.
    UnknownTopic(String),
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound(key) => write!(f, "item not found: {key}"),
            Self::PrimaryKeyPropertyNotDefined => {
                write!(f, "repository has no primary key property defined")
            }
            Self::MissingPrimaryKey(property) => {
                write!(f, "entity has no value for primary key `{property}`")
            }
            Self::DuplicateKey(key) => write!(f, "item already exists: {key}"),
            Self::InvalidData(message) => write!(f, "invalid item data: {message}"),
            Self::UnknownTopic(topic) => write!(f, "topic not in cluster: {topic}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound(_))
    }
}

impl From<ModelError> for RepoError {
    fn from(value: ModelError) -> Self {
        Self::InvalidData(value.to_string())
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

/// Field-equality filter for `list`.
///
/// Conditions apply to the fields of the materialized entity and must all
/// hold (logical AND). An empty filter matches every record. Integers and
/// strings compare by canonical key text, so `1` matches `"1"`, the same
/// way SQLite column affinity compares them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an exact-match condition on `field`.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((field, value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns whether `record` satisfies every condition.
    ///
    /// A condition on a field the record lacks only matches `null`.
    pub fn matches(&self, record: &Record) -> bool {
        self.fields.iter().all(|(name, expected)| {
            let actual = record.get(name).unwrap_or(&Value::Null);
            scalar_eq(actual, expected)
        })
    }
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            Key::from_value(actual) == Key::from_value(expected)
        }
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::Filter;
    use crate::model::dump;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        let record = dump(&json!({"id": "1"})).unwrap();
        assert!(Filter::new().matches(&record));
    }

    #[test]
    fn all_conditions_must_match_exactly() {
        let record = dump(&json!({"id": "2", "login": "b", "age": 30})).unwrap();

        assert!(Filter::new().with("login", "b").with("age", 30).matches(&record));
        assert!(!Filter::new().with("login", "b").with("age", 31).matches(&record));
        assert!(!Filter::new().with("missing", "x").matches(&record));
    }

    #[test]
    fn integers_and_strings_compare_as_keys() {
        let record = dump(&json!({"id": "2", "owner_id": 7, "ratio": 1.5})).unwrap();

        assert!(Filter::new().with("id", 2).matches(&record));
        assert!(Filter::new().with("owner_id", "7").matches(&record));
        assert!(!Filter::new().with("owner_id", "07").matches(&record));
        assert!(!Filter::new().with("ratio", "1").matches(&record));
        assert!(!Filter::new().with("id", true).matches(&record));
    }

    #[test]
    fn repeated_field_replaces_condition() {
        let filter = Filter::new().with("login", "a").with("login", "b");
        assert_eq!(filter.iter().count(), 1);
    }
}
