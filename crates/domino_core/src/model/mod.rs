//! Domain model building blocks shared by repositories and services.
//!
//! # Responsibility
//! - Define the identity contract (`Entity`) and value semantics (`ValueObject`).
//! - Canonicalize heterogeneous identifiers into one textual `Key`.
//! - Convert typed entities/DTOs into field records (`dump`) and back
//!   (`materialize`).
//!
//! # Invariants
//! - Every stored record is a JSON object keyed by field name.
//! - A field missing from a dumped DTO means "unset", an explicit `null`
//!   means "cleared".

mod key;
mod patch;

pub use key::Key;
pub use patch::Patch;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::Hash;

/// Field-name keyed representation of an entity or payload.
pub type Record = Map<String, Value>;

/// Domain object with a stable identity.
///
/// Two entities are the same entity when their keys are equal, regardless of
/// the rest of their state. Use [`same_identity`] instead of `==` when that is
/// the comparison you mean.
pub trait Entity {
    /// Returns the canonical identity of this entity.
    fn key(&self) -> Key;
}

/// Compares two entities by identity only.
pub fn same_identity<A: Entity + ?Sized, B: Entity + ?Sized>(left: &A, right: &B) -> bool {
    left.key() == right.key()
}

/// Marker for objects compared and hashed by their full field set.
///
/// Derive `Clone, PartialEq, Eq, Hash, Debug` on the implementing type; the
/// bounds make the value semantics explicit at use sites.
pub trait ValueObject: Clone + Eq + Hash + std::fmt::Debug {}

/// Marker for entities that own a consistency boundary over other entities.
pub trait Aggregate: Entity {}

/// Conversion failure between typed models and records.
#[derive(Debug)]
pub enum ModelError {
    /// Value did not serialize to a JSON object.
    NotAnObject(&'static str),
    /// `serde_json` rejected the value in one direction or the other.
    Serde(serde_json::Error),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(kind) => write!(f, "expected a field record, got {kind}"),
            Self::Serde(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotAnObject(_) => None,
            Self::Serde(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Serializes a model into its field record.
///
/// Fields skipped by `serde` (for example `Option::None` with
/// `skip_serializing_if`) are absent from the result.
pub fn dump<T: Serialize + ?Sized>(value: &T) -> Result<Record, ModelError> {
    match serde_json::to_value(value)? {
        Value::Object(record) => Ok(record),
        other => Err(ModelError::NotAnObject(value_kind(&other))),
    }
}

/// Builds a typed model from a field record.
///
/// Fields unknown to `T` are ignored unless `T` opts into
/// `deny_unknown_fields`.
pub fn materialize<T: DeserializeOwned>(record: Record) -> Result<T, ModelError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Returns whether a field value counts as "set" for relation lookups.
///
/// `null`, `false`, `0`, empty strings and empty containers are not set.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::{dump, is_truthy, materialize, same_identity, Entity, Key, ModelError};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: Key,
        login: String,
    }

    impl Entity for Account {
        fn key(&self) -> Key {
            self.id.clone()
        }
    }

    #[test]
    fn entities_compare_by_identity() {
        let before = Account {
            id: Key::from(7),
            login: "before".to_string(),
        };
        let after = Account {
            id: Key::from("7"),
            login: "after".to_string(),
        };

        assert!(same_identity(&before, &after));
        assert_ne!(before, after);
    }

    #[test]
    fn dump_and_materialize_keep_fields() {
        let record = dump(&json!({"id": 1, "login": "a"})).unwrap();
        let account: Account = materialize(record).unwrap();

        assert_eq!(account.id.as_str(), "1");
        assert_eq!(account.login, "a");
    }

    #[test]
    fn dump_rejects_non_object_values() {
        let err = dump(&42).unwrap_err();
        assert!(matches!(err, ModelError::NotAnObject("a number")));
    }

    #[test]
    fn truthiness_follows_empty_and_zero_values() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(2)));
        assert!(is_truthy(&json!("2")));
    }
}
