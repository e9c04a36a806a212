//! Business-rule validation.
//!
//! A rule is a predicate with a stable identifier and a human-readable
//! message. Checking a broken rule yields a `BusinessRuleViolation`, which
//! services return to their callers and which serializes to
//! `{"id": ..., "message": ...}` at application boundaries.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::{Display, Formatter};

/// Rule identifier: either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleId {
    Number(i64),
    Text(String),
}

impl Display for RuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for RuleId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for RuleId {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RuleId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Raised when a business rule is not satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRuleViolation {
    pub id: RuleId,
    pub message: String,
}

impl BusinessRuleViolation {
    pub fn new(id: impl Into<RuleId>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "id": self.id, "message": self.message })
    }
}

impl Display for BusinessRuleViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "business rule {} violated: {}", self.id, self.message)
    }
}

impl std::error::Error for BusinessRuleViolation {}

pub trait BusinessRule {
    fn rule_id(&self) -> RuleId;
    fn error_message(&self) -> String;
    fn is_satisfied(&self) -> bool;

    /// Returns the violation for an unsatisfied rule.
    fn check(&self) -> Result<(), BusinessRuleViolation> {
        if self.is_satisfied() {
            Ok(())
        } else {
            log::debug!(
                "event=rule_check module=rule status=violated rule_id={}",
                self.rule_id()
            );
            Err(BusinessRuleViolation::new(
                self.rule_id(),
                self.error_message(),
            ))
        }
    }
}

/// Checks `rule`, for call sites that hold it behind a reference.
pub fn check_rule<R: BusinessRule + ?Sized>(rule: &R) -> Result<(), BusinessRuleViolation> {
    rule.check()
}
