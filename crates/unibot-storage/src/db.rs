//! SQLite handle shared by the repositories.
//!
//! File databases run in WAL mode; both file and in-memory handles are
//! migrated before they are returned.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use unibot_core::error::UnibotError;

use crate::migrations;

pub(crate) fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> UnibotError + '_ {
    move |e| UnibotError::Storage(format!("{}: {}", context, e))
}

/// One connection behind a mutex; rusqlite connections are `Send` but not `Sync`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file, creating parent directories.
    pub fn new(path: &Path) -> Result<Self, UnibotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage_err("Failed to open database"))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(storage_err("Failed to enable WAL"))?;
        let db = Self::migrated(conn)?;
        info!(path = %path.display(), "Database ready");
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, UnibotError> {
        let conn = Connection::open_in_memory()
            .map_err(storage_err("Failed to open in-memory database"))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, UnibotError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(storage_err("Failed to enable foreign keys"))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, UnibotError>
    where
        F: FnOnce(&Connection) -> Result<T, UnibotError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| UnibotError::Storage("Database lock poisoned".to_string()))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
