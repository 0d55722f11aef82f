use booonus_core::db::migrations::latest_version;
use booonus_core::db::{open_db, open_db_in_memory, DbError};
use booonus_core::repo::kv_repo::{KEY_API_BASE_URL, KEY_AUTH_TOKEN};
use booonus_core::{KvRepository, RepoError, SqliteKvRepository};
use rusqlite::Connection;

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();
    assert_eq!(schema_version(&conn), latest_version());

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'kv';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(table_count, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn set_overwrites_and_remove_is_idempotent() {
    let repo = SqliteKvRepository::new(open_db_in_memory().unwrap());

    assert_eq!(repo.get(KEY_AUTH_TOKEN).unwrap(), None);
    repo.set(KEY_AUTH_TOKEN, "first").unwrap();
    repo.set(KEY_AUTH_TOKEN, "second").unwrap();
    assert_eq!(repo.get(KEY_AUTH_TOKEN).unwrap().as_deref(), Some("second"));

    repo.remove(KEY_AUTH_TOKEN).unwrap();
    repo.remove(KEY_AUTH_TOKEN).unwrap();
    assert_eq!(repo.get(KEY_AUTH_TOKEN).unwrap(), None);
}

#[test]
fn blank_keys_are_rejected() {
    let repo = SqliteKvRepository::new(open_db_in_memory().unwrap());
    assert!(matches!(repo.set("  ", "x"), Err(RepoError::InvalidKey(_))));
}

#[test]
fn values_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("booonus.sqlite3");

    let repo = SqliteKvRepository::new(open_db(&path).unwrap());
    repo.set(KEY_API_BASE_URL, "http://10.0.0.5:8080").unwrap();
    drop(repo);

    let reopened = SqliteKvRepository::new(open_db(&path).unwrap());
    assert_eq!(
        reopened.get(KEY_API_BASE_URL).unwrap().as_deref(),
        Some("http://10.0.0.5:8080")
    );
}
