//! Users/tasks example domain shared by the integration tests.
#![allow(dead_code)]

use domino_core::{Entity, Key, KvRepository, Patch, RepoResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Key,
    pub login: String,
}

impl Entity for User {
    fn key(&self) -> Key {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Key>,
    pub login: String,
}

impl NewUser {
    pub fn login(login: &str) -> Self {
        Self {
            id: None,
            login: login.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
}

pub type UserRepository = KvRepository<User, NewUser, UserPatch>;

/// Users `test-one`, `test-two`, `test-three` under keys 1 to 3.
pub fn user_repository() -> RepoResult<UserRepository> {
    UserRepository::builder()
        .primary_key("id")
        .fixtures(["test-one", "test-two", "test-three"].map(NewUser::login))
        .build()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Key,
    pub name: String,
    #[serde(default)]
    pub user_id: Option<Key>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl Entity for Task {
    fn key(&self) -> Key {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewTask {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl NewTask {
    pub fn new(name: &str, user_id: Option<i64>) -> Self {
        Self {
            name: name.to_string(),
            user_id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub user_id: Patch<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

pub type TaskRepository = KvRepository<Task, NewTask, TaskPatch>;

/// Four tasks owned by users 1, 1, 2 and 3, resolving `user` through a
/// fresh user repository.
pub fn task_repository() -> RepoResult<TaskRepository> {
    TaskRepository::builder()
        .primary_key("id")
        .foreign_key("user", user_repository)
        .fixtures([
            NewTask::new("test-one", Some(1)),
            NewTask::new("test-two", Some(1)),
            NewTask::new("test-three", Some(2)),
            NewTask::new("test-four", Some(3)),
        ])
        .build()
}
