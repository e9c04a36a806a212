mod common;

use common::{task_repository, user_repository, NewTask, TaskPatch, TaskRepository, UserRepository};
use domino_core::{
    CreateRepository, Filter, GetRepository, Key, ListRepository, Patch, RepoError,
    SaveRepository, UpdateRepository,
};
use serde_json::json;

#[test]
fn get_embeds_the_related_entity() {
    let repo = task_repository().unwrap();

    let task = repo.get(&Key::from(1)).unwrap();
    assert_eq!(
        serde_json::to_value(&task).unwrap(),
        json!({
            "id": "1",
            "name": "test-one",
            "user_id": "1",
            "done": false,
            "user": {"id": "1", "login": "test-one"}
        })
    );
}

#[test]
fn changing_the_foreign_key_changes_the_relation() {
    let mut repo = task_repository().unwrap();

    let task = repo
        .update(
            &Key::from(1),
            &TaskPatch {
                user_id: Patch::Set(2),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert_eq!(task.user.unwrap().login, "test-two");
    assert_eq!(task.name, "test-one");
}

#[test]
fn clearing_the_foreign_key_drops_the_relation() {
    let mut repo = task_repository().unwrap();

    let task = repo
        .update(
            &Key::from(4),
            &TaskPatch {
                user_id: Patch::Clear,
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert_eq!(task.user_id, None);
    assert_eq!(task.user, None);
}

#[test]
fn dangling_foreign_key_is_omitted() {
    let mut repo = task_repository().unwrap();

    let task = repo.create(&NewTask::new("orphan", Some(99))).unwrap();
    assert_eq!(task.user_id, Some(Key::from(99)));
    assert!(task.user.is_none());
}

#[test]
fn list_matches_integer_foreign_key_filters() {
    let repo = task_repository().unwrap();

    let (count, tasks) = repo.list(&Filter::new().with("user_id", 1)).unwrap();
    assert_eq!(count, 2);
    assert!(tasks
        .iter()
        .all(|task| task.user.as_ref().unwrap().login == "test-one"));
}

#[test]
fn list_matches_values_read_from_materialized_entities() {
    let repo = task_repository().unwrap();

    let owner = repo.get(&Key::from(1)).unwrap().user_id.unwrap();
    assert_eq!(owner, Key::from("1"));

    let (count, tasks) = repo.list(&Filter::new().with("user_id", owner)).unwrap();
    assert_eq!(count, 2);
    let ids: Vec<Key> = tasks.into_iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![Key::from(1), Key::from(2)]);
}

#[test]
fn saving_an_unchanged_entity_keeps_list_results() {
    let mut repo = task_repository().unwrap();
    let by_number = Filter::new().with("user_id", 1);
    let by_text = Filter::new().with("user_id", "1");

    let (before, _) = repo.list(&by_number).unwrap();
    let task = repo.get(&Key::from(1)).unwrap();
    repo.save(&task).unwrap();

    assert_eq!(before, 2);
    assert_eq!(repo.list(&by_number).unwrap().0, 2);
    assert_eq!(repo.list(&by_text).unwrap().0, 2);
}

#[test]
fn save_does_not_store_resolved_relations() {
    let mut repo = task_repository().unwrap();

    let mut task = repo.get(&Key::from(3)).unwrap();
    task.name = "renamed".to_string();
    let saved = repo.save(&task).unwrap();

    assert_eq!(saved.user.unwrap().login, "test-two");
    let raw = repo.raw(&Key::from(3)).unwrap();
    assert!(!raw.contains_key("user"));
    assert_eq!(raw["name"], json!("renamed"));
}

#[test]
fn relation_factory_errors_fail_the_build() {
    let err = TaskRepository::builder()
        .primary_key("id")
        .foreign_key("user", || UserRepository::builder().build())
        .build()
        .unwrap_err();
    assert!(matches!(err, RepoError::PrimaryKeyPropertyNotDefined));
}

#[test]
fn each_repository_owns_its_fixtures() {
    let mut first = user_repository().unwrap();
    let second = user_repository().unwrap();

    first.create(&common::NewUser::login("extra")).unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 3);
}
