//! Database module for the trainer attendance service
//!
//! Provides SQLite storage for trainer sessions and daily attendance.

pub mod schema;

use crate::error::{CoreError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared SQLite connection
///
/// All statements go through one connection guarded by a mutex, so each
/// closure passed to [`Database::with_conn`] runs without interleaving.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file and initialize the schema
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        schema::init_db(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(db_path),
        })
    }

    /// Private in-memory database, used by tests and ephemeral runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_db(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Run a closure against the connection on the blocking thread pool
    pub async fn with_conn<F, T, E>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<CoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CoreError::StoreUnavailable("connection mutex poisoned".into()))?;
            f(&guard).map_err(Into::into)
        })
        .await
        .map_err(|e| CoreError::StoreUnavailable(format!("database task failed: {}", e)))?
    }

    /// Database file path, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_creation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("attendance.db");

        let db = Database::new(db_path.clone()).unwrap();
        assert_eq!(db.path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_with_conn_runs_queries() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM trainer_sessions", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_with_conn_surfaces_errors() {
        let db = Database::open_in_memory().unwrap();
        let result = db
            .with_conn(|conn| conn.execute("SELECT * FROM missing_table", []))
            .await;
        assert!(matches!(result, Err(CoreError::Database(_))));
    }
}
