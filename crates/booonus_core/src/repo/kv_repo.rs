//! Key-value repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist small string values (serialized profile, token, base URL)
//!   across process restarts.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Keys are non-blank after trimming.
//! - `set` overwrites; `remove` of a missing key is a no-op.

use crate::db::DbError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Serialized signed-in `UserProfile` mirror.
pub const KEY_PROFILE: &str = "profile";
/// Bearer token returned by login/register.
pub const KEY_AUTH_TOKEN: &str = "auth_token";
/// User-configured API base address (without the `/api/v1` prefix).
pub const KEY_API_BASE_URL: &str = "api_base_url";

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for key-value persistence operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidKey(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidKey(key) => write!(f, "invalid storage key `{key}`"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidKey(_) => None,
        }
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

/// Repository interface for the local key-value store.
pub trait KvRepository: Send + Sync {
    fn get(&self, key: &str) -> RepoResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> RepoResult<()>;
    fn remove(&self, key: &str) -> RepoResult<()>;
}

/// SQLite-backed key-value repository.
///
/// Owns its connection so it can be shared with deferred tasks.
pub struct SqliteKvRepository {
    conn: Mutex<Connection>,
}

impl SqliteKvRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl KvRepository for SqliteKvRepository {
    fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let key = normalize_key(key)?;
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1;", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        let key = normalize_key(key)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> RepoResult<()> {
        let key = normalize_key(key)?;
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1;", [key])?;
        Ok(())
    }
}

fn normalize_key(key: &str) -> RepoResult<&str> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(RepoError::InvalidKey(key.to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::{normalize_key, RepoError};

    #[test]
    fn normalize_key_trims_and_rejects_blank() {
        assert_eq!(normalize_key("  profile ").expect("key should trim"), "profile");
        assert!(matches!(normalize_key("   "), Err(RepoError::InvalidKey(_))));
    }
}
