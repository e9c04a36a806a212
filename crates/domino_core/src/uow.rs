//! Unit of work over a set of transactional repositories.
//!
//! # Responsibility
//! - Drive begin/commit/rollback across every member repository.
//! - Provide scoped acquisition (`run`) so a business operation either
//!   commits as a whole or rolls back and re-propagates its error.
//!
//! # Invariants
//! - `begin` never re-begins a member that is already in a transaction.
//! - `commit` and `rollback` only touch members currently in a transaction.
//! - An error returned by the scope body reaches the caller unchanged.
//!
//! # See also
//! - `service::Service::transaction` for the service-level entry point.

use crate::repo::{RepoError, RepoResult, Transactional};
use log::{debug, error, info, warn};
use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use uuid::Uuid;

/// Named member handed to the transaction driver.
pub type Member<'a> = (&'a str, &'a mut dyn Transactional);

/// Transaction-scoped aggregate of repositories.
///
/// Implementors only list their members; the state machine is provided.
pub trait UnitOfWork {
    fn members(&mut self) -> Vec<Member<'_>>;

    /// Begins every member not already in a transaction.
    ///
    /// When a member fails to begin, the members begun by this call are
    /// rolled back before the error is returned.
    fn begin(&mut self) -> RepoResult<()> {
        begin_members(self.members())
    }

    fn commit(&mut self) -> RepoResult<()> {
        commit_members(self.members())
    }

    /// Rolls back every open member, reporting the first failure after all
    /// members were attempted.
    fn rollback(&mut self) -> RepoResult<()> {
        rollback_members(self.members())
    }

    fn is_active(&mut self) -> bool {
        self.members()
            .iter()
            .any(|(_, member)| member.in_transaction())
    }

    /// Called by `run` once its scope has committed or rolled back.
    fn finish(&mut self) {}

    /// Runs `body` inside one transaction scope.
    ///
    /// # Contract
    /// - `Ok` commits; a failed commit rolls back and returns the commit error.
    /// - `Err` rolls back and returns the body's error unchanged.
    /// - A panic rolls back, then resumes unwinding.
    /// - Every path that got past `begin` ends with `finish`.
    fn run<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<RepoError>,
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let scope = Uuid::new_v4();
        self.begin()?;
        debug!("event=uow_scope module=uow status=begin scope={scope}");

        let result = match panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
            Ok(Ok(value)) => match self.commit() {
                Ok(()) => {
                    info!("event=uow_scope module=uow status=committed scope={scope}");
                    Ok(value)
                }
                Err(err) => {
                    error!(
                        "event=uow_scope module=uow status=commit_failed scope={scope} error={err}"
                    );
                    rollback_quietly(self, scope);
                    Err(err.into())
                }
            },
            Ok(Err(err)) => {
                warn!("event=uow_scope module=uow status=rolled_back scope={scope}");
                rollback_quietly(self, scope);
                Err(err)
            }
            Err(payload) => {
                error!("event=uow_scope module=uow status=panicked scope={scope}");
                rollback_quietly(self, scope);
                self.finish();
                panic::resume_unwind(payload)
            }
        };
        self.finish();
        result
    }
}

fn rollback_quietly<W: UnitOfWork + ?Sized>(uow: &mut W, scope: Uuid) {
    if let Err(err) = uow.rollback() {
        error!("event=uow_rollback module=uow status=error scope={scope} error={err}");
    }
}

fn begin_members(mut members: Vec<Member<'_>>) -> RepoResult<()> {
    let mut begun = Vec::new();
    let mut failure = None;

    for (index, (name, member)) in members.iter_mut().enumerate() {
        if member.in_transaction() {
            continue;
        }
        match member.begin() {
            Ok(()) => begun.push(index),
            Err(err) => {
                error!("event=uow_begin module=uow status=error member={name} error={err}");
                failure = Some(err);
                break;
            }
        }
    }

    let Some(err) = failure else {
        return Ok(());
    };
    for index in begun {
        let (name, member) = &mut members[index];
        if let Err(rollback_err) = member.rollback() {
            error!(
                "event=uow_begin module=uow status=rollback_failed member={name} error={rollback_err}"
            );
        }
    }
    Err(err)
}

fn commit_members(mut members: Vec<Member<'_>>) -> RepoResult<()> {
    for (name, member) in members.iter_mut() {
        if !member.in_transaction() {
            continue;
        }
        member.commit()?;
        debug!("event=uow_commit module=uow status=ok member={name}");
    }
    Ok(())
}

fn rollback_members(mut members: Vec<Member<'_>>) -> RepoResult<()> {
    let mut first_error = None;
    for (name, member) in members.iter_mut() {
        if !member.in_transaction() {
            continue;
        }
        match member.rollback() {
            Ok(()) => debug!("event=uow_rollback module=uow status=ok member={name}"),
            Err(err) => {
                error!("event=uow_rollback module=uow status=error member={name} error={err}");
                first_error.get_or_insert(err);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Lifecycle of a `RepositorySet`.
///
/// `begin` moves `Idle` to `Active`; `commit` and `rollback` move to
/// `Committed` or `RolledBack`; `finish` returns to `Idle` and keeps the
/// outcome in `RepositorySet::last_outcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOfWorkError {
    /// A registered component does not expose the transaction contract.
    NotARepository(String),
    DuplicateMember(String),
}

impl Display for UnitOfWorkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotARepository(name) => write!(f, "component `{name}` is not a repository"),
            Self::DuplicateMember(name) => write!(f, "duplicate unit-of-work member `{name}`"),
        }
    }
}

impl std::error::Error for UnitOfWorkError {}

/// Anything that can be registered in a `RepositorySet`.
///
/// Every `Transactional` type is a component; other types may implement it
/// and answer `None`, which makes registration fail.
pub trait Component: Any {
    fn as_transactional(&self) -> Option<&dyn Transactional>;
    fn as_transactional_mut(&mut self) -> Option<&mut dyn Transactional>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Transactional + 'static> Component for T {
    fn as_transactional(&self) -> Option<&dyn Transactional> {
        Some(self)
    }

    fn as_transactional_mut(&mut self) -> Option<&mut dyn Transactional> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Ordered, name-addressed unit of work assembled at runtime.
pub struct RepositorySet {
    members: Vec<(String, Box<dyn Component>)>,
    state: UowState,
    last_outcome: Option<UowState>,
}

impl RepositorySet {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            state: UowState::Idle,
            last_outcome: None,
        }
    }

    /// Builds a set from named components, validating each one.
    pub fn with_members<I, S>(components: I) -> Result<Self, UnitOfWorkError>
    where
        I: IntoIterator<Item = (S, Box<dyn Component>)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (name, component) in components {
            set.insert_boxed(name.into(), component)?;
        }
        Ok(set)
    }

    /// Registers one component under `name`.
    pub fn register<R: Component>(
        &mut self,
        name: impl Into<String>,
        component: R,
    ) -> Result<(), UnitOfWorkError> {
        self.insert_boxed(name.into(), Box::new(component))
    }

    fn insert_boxed(
        &mut self,
        name: String,
        component: Box<dyn Component>,
    ) -> Result<(), UnitOfWorkError> {
        if component.as_transactional().is_none() {
            return Err(UnitOfWorkError::NotARepository(name));
        }
        if self.members.iter().any(|(existing, _)| *existing == name) {
            return Err(UnitOfWorkError::DuplicateMember(name));
        }
        self.members.push((name, component));
        Ok(())
    }

    pub fn state(&self) -> UowState {
        self.state
    }

    /// `Committed` or `RolledBack` for the most recently ended transaction.
    pub fn last_outcome(&self) -> Option<UowState> {
        self.last_outcome
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    /// Typed access to a member; `None` for an unknown name or wrong type.
    pub fn repository<R: 'static>(&self, name: &str) -> Option<&R> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .and_then(|(_, component)| component.as_any().downcast_ref::<R>())
    }

    pub fn repository_mut<R: 'static>(&mut self, name: &str) -> Option<&mut R> {
        self.members
            .iter_mut()
            .find(|(member, _)| member == name)
            .and_then(|(_, component)| component.as_any_mut().downcast_mut::<R>())
    }
}

impl Default for RepositorySet {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for RepositorySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySet")
            .field("members", &self.names().collect::<Vec<_>>())
            .field("state", &self.state)
            .finish()
    }
}

impl UnitOfWork for RepositorySet {
    fn members(&mut self) -> Vec<Member<'_>> {
        self.members
            .iter_mut()
            .filter_map(|(name, component)| {
                component
                    .as_transactional_mut()
                    .map(|member| (name.as_str(), member))
            })
            .collect()
    }

    fn begin(&mut self) -> RepoResult<()> {
        begin_members(self.members())?;
        self.state = UowState::Active;
        Ok(())
    }

    fn commit(&mut self) -> RepoResult<()> {
        commit_members(self.members())?;
        self.state = UowState::Committed;
        self.last_outcome = Some(UowState::Committed);
        Ok(())
    }

    fn rollback(&mut self) -> RepoResult<()> {
        let result = rollback_members(self.members());
        self.state = UowState::RolledBack;
        self.last_outcome = Some(UowState::RolledBack);
        result
    }

    fn finish(&mut self) {
        self.state = UowState::Idle;
    }
}
