//! Store handle: connection management, pragmas, and migrations.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::error::StoreResult;

/// Current unix time in seconds.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Thread-safe store handle backed by a single SQLite connection.
///
/// The connection is serialized behind a mutex; SQLite's own busy timeout
/// covers contention from other processes (e.g. the `generate` CLI run
/// against a live server).
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store at the given path and run migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        debug!(?path, "store opened");
        Ok(store)
    }

    /// Ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn migrate(&self) -> StoreResult<()> {
        self.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sites (
              id          INTEGER PRIMARY KEY AUTOINCREMENT,
              site_key    TEXT NOT NULL UNIQUE,
              title       TEXT NOT NULL DEFAULT '',
              status      TEXT NOT NULL DEFAULT 'active',
              created_at  INTEGER NOT NULL,
              updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
              id           TEXT PRIMARY KEY,
              site_id      INTEGER NOT NULL REFERENCES sites(id),
              entry_id     TEXT,
              post_path    TEXT NOT NULL,
              parent_id    TEXT REFERENCES comments(id),
              status       TEXT NOT NULL,
              author       TEXT NOT NULL,
              email        TEXT NOT NULL,
              author_url   TEXT,
              body         TEXT NOT NULL,
              ip           TEXT,
              created_at   INTEGER NOT NULL,
              approved_at  INTEGER,
              rejected_at  INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_comments_site_status_created
              ON comments(site_id, status, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_site_post_created
              ON comments(site_id, post_path, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_site_parent_created
              ON comments(site_id, parent_id, created_at);

            CREATE TABLE IF NOT EXISTS pipeline_runs (
              id                  INTEGER PRIMARY KEY AUTOINCREMENT,
              site_id             INTEGER NOT NULL REFERENCES sites(id),
              trigger_comment_id  TEXT,
              state               TEXT NOT NULL,
              step                TEXT,
              error_message       TEXT,
              created_at          INTEGER NOT NULL,
              started_at          INTEGER,
              finished_at         INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_runs_site_created
              ON pipeline_runs(site_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_runs_state_created
              ON pipeline_runs(state, created_at);

            CREATE TABLE IF NOT EXISTS users (
              id          INTEGER PRIMARY KEY AUTOINCREMENT,
              password    TEXT NOT NULL,
              first_name  TEXT NOT NULL DEFAULT '',
              last_name   TEXT NOT NULL DEFAULT '',
              email       TEXT NOT NULL UNIQUE,
              created_at  INTEGER NOT NULL,
              updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_sites (
              user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              site_id  INTEGER NOT NULL REFERENCES sites(id),
              PRIMARY KEY (user_id, site_id)
            );
            "#,
        )?;
        debug!("migrations applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_and_migrate() {
        let store = Store::open_in_memory().unwrap();
        // Migrations are idempotent.
        store.migrate().unwrap();
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        {
            let store = Store::open(&db_path).unwrap();
            store.sync_sites(&[("blog".to_string(), "Blog".to_string())].into()).unwrap();
        }

        let store = Store::open(&db_path).unwrap();
        let site_id = store.site_id_by_key("blog").unwrap();
        assert!(site_id.is_some());
    }

    #[test]
    fn foreign_keys_enforced() {
        let store = Store::open_in_memory().unwrap();
        let comment = crate::comments::tests::pending_comment("c1", 42, "/p/x/");
        // site_id 42 does not exist.
        assert!(store.insert_comment(&comment).is_err());
    }
}
