mod common;

use common::{task_repository, user_repository, NewTask, NewUser, TaskRepository, UserRepository};
use domino_core::uow::Member;
use domino_core::{
    BusinessRuleViolation, CreateRepository, GetRepository, Key, RepoError, RepositorySet,
    ServiceError, Transactional, UnitOfWork, UowState,
};

struct TasksUnitOfWork {
    users: UserRepository,
    tasks: TaskRepository,
}

impl TasksUnitOfWork {
    fn new() -> Self {
        Self {
            users: user_repository().unwrap(),
            tasks: task_repository().unwrap(),
        }
    }
}

impl UnitOfWork for TasksUnitOfWork {
    fn members(&mut self) -> Vec<Member<'_>> {
        vec![
            ("users", &mut self.users as &mut dyn Transactional),
            ("tasks", &mut self.tasks as &mut dyn Transactional),
        ]
    }
}

#[test]
fn run_commits_when_the_body_succeeds() {
    let mut uow = TasksUnitOfWork::new();

    let created = uow
        .run(|uow| -> Result<_, RepoError> {
            assert!(uow.users.in_transaction());
            assert!(uow.tasks.in_transaction());
            uow.tasks.create(&NewTask::new("inside", Some(2)))
        })
        .unwrap();

    assert!(!uow.is_active());
    assert_eq!(uow.tasks.get(&created.id).unwrap().name, "inside");
}

#[test]
fn run_rolls_back_and_returns_the_body_error_unchanged() {
    let mut uow = TasksUnitOfWork::new();

    let err = uow
        .run(|uow| -> Result<(), ServiceError> {
            uow.users.create(&NewUser::login("temp"))?;
            Err(BusinessRuleViolation::new(7, "rejected").into())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Rule(ref violation) if violation.message == "rejected"
    ));
    assert!(!uow.users.in_transaction());
    assert!(!uow.tasks.in_transaction());
}

#[test]
fn repository_errors_propagate_out_of_the_scope() {
    let mut uow = TasksUnitOfWork::new();

    let err = uow
        .run(|uow| uow.users.get(&Key::from(404)))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!uow.is_active());
}

#[test]
fn begin_skips_members_already_in_a_transaction() {
    let mut uow = TasksUnitOfWork::new();

    uow.users.begin().unwrap();
    uow.begin().unwrap();
    assert!(uow.users.in_transaction() && uow.tasks.in_transaction());

    uow.begin().unwrap();
    uow.commit().unwrap();
    assert!(!uow.is_active());

    uow.rollback().unwrap();
}

#[test]
fn repository_set_tracks_state_and_gives_typed_access() {
    let mut set = RepositorySet::new();
    set.register("users", user_repository().unwrap()).unwrap();
    set.register("tasks", task_repository().unwrap()).unwrap();
    assert_eq!(set.state(), UowState::Idle);

    let login = set
        .run(|set| -> Result<String, RepoError> {
            assert_eq!(set.state(), UowState::Active);
            let users = set.repository_mut::<UserRepository>("users").unwrap();
            Ok(users.create(&NewUser::login("dynamic"))?.login)
        })
        .unwrap();

    assert_eq!(login, "dynamic");
    assert_eq!(set.state(), UowState::Idle);
    assert_eq!(set.last_outcome(), Some(UowState::Committed));
    assert_eq!(set.names().collect::<Vec<_>>(), vec!["users", "tasks"]);
    assert_eq!(
        set.repository::<UserRepository>("users").unwrap().len(),
        4
    );

    let _ = set.run(|_| -> Result<(), RepoError> { Err(RepoError::ItemNotFound(Key::from(1))) });
    assert_eq!(set.state(), UowState::Idle);
    assert_eq!(set.last_outcome(), Some(UowState::RolledBack));
}
