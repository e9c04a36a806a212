//! SQLite storage bootstrap for the relational repository adapter.
//!
//! # Responsibility
//! - Turn a `DatabaseConfig` into an open, configured SQLite connection.
//! - Apply caller-supplied schema migrations in deterministic order.
//! - Hand out the `Session` handle repositories share inside a unit of work.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories must not read/write data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod config;
pub mod migrations;
mod open;
mod session;

pub use config::{DatabaseConfig, SqliteTarget};
pub use migrations::Migration;
pub use open::{open_db, open_db_in_memory, open_from_config};
pub use session::Session;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// DSN string could not be parsed.
    InvalidDsn(String),
    /// DSN names a driver this adapter cannot open.
    UnsupportedDriver(String),
    /// Table or column name is not a plain SQL identifier.
    InvalidIdentifier(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::InvalidDsn(dsn) => write!(f, "invalid database dsn `{dsn}`"),
            Self::UnsupportedDriver(driver) => {
                write!(f, "unsupported database driver `{driver}`; expected sqlite")
            }
            Self::InvalidIdentifier(name) => write!(f, "invalid sql identifier `{name}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
