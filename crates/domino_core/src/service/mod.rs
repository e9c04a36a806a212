//! Service layer.
//!
//! # Responsibility
//! - Run one unit of work per business operation.
//! - Unify repository failures and business-rule violations for callers.
//!
//! # Invariants
//! - Services reach storage only through their unit of work.
//! - An operation that fails leaves its unit of work rolled back.

use crate::repo::RepoError;
use crate::rule::BusinessRuleViolation;
use crate::uow::UnitOfWork;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Repo(RepoError),
    Rule(BusinessRuleViolation),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_not_found())
    }

    pub fn violation(&self) -> Option<&BusinessRuleViolation> {
        match self {
            Self::Rule(violation) => Some(violation),
            Self::Repo(_) => None,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Rule(violation) => write!(f, "{violation}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Rule(violation) => Some(violation),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<BusinessRuleViolation> for ServiceError {
    fn from(value: BusinessRuleViolation) -> Self {
        Self::Rule(value)
    }
}

/// Business-operation boundary owning one unit of work.
///
/// ```ignore
/// fn rename(&mut self, id: Key, title: String) -> ServiceResult<Task> {
///     self.transaction(|uow| Ok(uow.tasks.update(&id, &TaskPatch::title(title))?))
/// }
/// ```
pub trait Service {
    type Uow: UnitOfWork;

    fn unit_of_work_mut(&mut self) -> &mut Self::Uow;

    /// Runs `body` in a fresh transaction scope of this service's unit of work.
    fn transaction<T, F>(&mut self, body: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut Self::Uow) -> ServiceResult<T>,
    {
        self.unit_of_work_mut().run(body)
    }
}
