use domino_core::db::migrations::{current_user_version, latest_version};
use domino_core::db::{open_db, open_db_in_memory, DbError, Migration};
use rusqlite::Connection;

const USERS: Migration = Migration {
    version: 1,
    sql: "CREATE TABLE users (id INTEGER PRIMARY KEY, login TEXT NOT NULL);",
};

const TASKS: Migration = Migration {
    version: 2,
    sql: "CREATE TABLE tasks (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        user_id INTEGER REFERENCES users(id)
    );",
};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory(&[USERS, TASKS]).unwrap();

    assert_eq!(current_user_version(&conn).unwrap(), 2);
    assert_table_exists(&conn, "users");
    assert_table_exists(&conn, "tasks");
}

#[test]
fn later_opens_apply_only_pending_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("domino.db");

    let first = open_db(&path, &[USERS]).unwrap();
    first
        .execute("INSERT INTO users (login) VALUES ('kept');", [])
        .unwrap();
    drop(first);

    let second = open_db(&path, &[USERS, TASKS]).unwrap();
    assert_eq!(
        current_user_version(&second).unwrap(),
        latest_version(&[USERS, TASKS])
    );
    assert_table_exists(&second, "tasks");
    let login: String = second
        .query_row("SELECT login FROM users WHERE id = 1;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(login, "kept");
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory(&[USERS, TASKS]).unwrap();

    let result = conn.execute(
        "INSERT INTO tasks (name, user_id) VALUES ('orphan', 42);",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path, &[USERS, TASKS]).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
