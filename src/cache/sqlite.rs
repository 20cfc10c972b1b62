//! SQLite Connection Module
//!
//! Opens the node's database file and creates the schema. The persistent
//! store and the lock manager share one [`Database`] handle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};
use tracing::info;

use crate::error::{CacheError, Result};

/// File name of the database inside the configured directory
pub const DATABASE_FILE: &str = "hypercache.sqlite";

/// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache(
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL,
        expiration INTEGER
    );
    CREATE TABLE IF NOT EXISTS cache_locks(
        key TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        expiration INTEGER
    );
";

// == Database ==
/// Shared handle to the node's SQLite database.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) `hypercache.sqlite` inside `directory`.
    ///
    /// Enables write-ahead logging so other processes can read while one
    /// writes, and creates both tables idempotently.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        let path = directory.join(DATABASE_FILE);
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        info!("SQLite store opened at {} (journal_mode={})", path.display(), mode);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` with exclusive use of the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CacheError::Internal("SQLite connection mutex poisoned".to_string()))?;
        Ok(f(&conn)?)
    }
}

/// True when `err` is a uniqueness (primary key) violation.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}
