//! SQLite-backed record store.
//!
//! A single connection guarded by a mutex. Every statement is short and
//! synchronous; no lock is held across an `.await`.

mod catalog;
mod instances;
mod records;

use std::path::Path;
use std::sync::Arc;

use labbox_shared::errors::{LabboxError, LabboxResult};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS instances (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    user_name        TEXT NOT NULL,
    challenge_id     TEXT NOT NULL,
    challenge_name   TEXT NOT NULL,
    flag             TEXT NOT NULL,
    exposed          TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    cpu_limit        REAL NOT NULL,
    memory_limit_mib INTEGER NOT NULL,
    status           TEXT NOT NULL,
    subdomain        TEXT NOT NULL DEFAULT '',
    access_url       TEXT NOT NULL DEFAULT '',
    message          TEXT NOT NULL DEFAULT '',
    created_at       INTEGER NOT NULL,
    expires_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instances_user ON instances(user_id);
CREATE INDEX IF NOT EXISTS idx_instances_status ON instances(status);

CREATE TABLE IF NOT EXISTS challenges (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    points           INTEGER NOT NULL DEFAULT 0,
    flag             TEXT NOT NULL DEFAULT '',
    dynamic_flag     INTEGER NOT NULL DEFAULT 0,
    image_id         TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    enabled          INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS images (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    registry         TEXT NOT NULL,
    cpu_limit        REAL NOT NULL,
    memory_limit_mib INTEGER NOT NULL,
    exposed          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id   TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS solves (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    challenge_id  TEXT NOT NULL,
    points        INTEGER NOT NULL,
    start_at      INTEGER NOT NULL,
    solved_at     INTEGER NOT NULL,
    used_time     INTEGER NOT NULL,
    used_time_str TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_solves_user_challenge ON solves(user_id, challenge_id);

CREATE TABLE IF NOT EXISTS challenge_records (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL,
    user_name      TEXT NOT NULL,
    challenge_id   TEXT NOT NULL,
    challenge_name TEXT NOT NULL,
    instance_id    TEXT NOT NULL,
    created_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_challenge_records_instance ON challenge_records(instance_id);
"#;

/// Handle to the record store. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> LabboxResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                LabboxError::Storage(format!(
                    "failed to create database dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            LabboxError::Storage(format!("failed to open {}: {}", path.display(), e))
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(storage)?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> LabboxResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> LabboxResult<Self> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        tracing::debug!("database schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// Map a SQLite error into the storage category.
pub(crate) fn storage(err: rusqlite::Error) -> LabboxError {
    LabboxError::Storage(err.to_string())
}
