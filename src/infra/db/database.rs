//! SQLite database setup and connection management for the review queue.
//! Handles opening, connection pragmas, migration at open time and
//! repository construction.

use super::repository::{
    CommitRepository, DbConn, JobRepository, RepoRepository, ResponseRepository,
    ReviewRepository, lock,
};
use super::schema;
use crate::domain::{StoreError, StoreResult};
use crate::infra::app_config::{StoreConfig, load_config};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handle to one queue database. Each worker process opens its own.
pub struct Database {
    conn: DbConn,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the database named by the loaded configuration
    pub fn open() -> StoreResult<Self> {
        Self::open_with(&load_config())
    }

    /// Open or create the database at a specific path with default settings
    pub fn open_at(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(&StoreConfig {
            db_path: Some(path.into()),
            ..StoreConfig::default()
        })
    }

    pub fn open_with(config: &StoreConfig) -> StoreResult<Self> {
        let path = config.resolved_db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Setup {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path)?;
        configure(&conn, Duration::from_millis(config.busy_timeout_ms))?;
        log::debug!("Opened review queue at {}", path.display());
        Self::from_connection(conn, Some(path))
    }

    /// Create an in-memory database (useful for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Self::from_connection(conn, None)
    }

    /// Migrate `conn` and wrap it. Any migration failure aborts the open.
    fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Where [`Database::open`] would put the database
    pub fn default_path() -> PathBuf {
        load_config().resolved_db_path()
    }

    /// Backing file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> DbConn {
        self.conn.clone()
    }

    pub fn schema_version(&self) -> StoreResult<i64> {
        let conn = lock(&self.conn)?;
        schema::current_version(&conn)
    }

    pub fn repo_repo(&self) -> RepoRepository {
        RepoRepository::new(self.connection())
    }

    pub fn commit_repo(&self) -> CommitRepository {
        CommitRepository::new(self.connection())
    }

    pub fn job_repo(&self) -> JobRepository {
        JobRepository::new(self.connection())
    }

    pub fn review_repo(&self) -> ReviewRepository {
        ReviewRepository::new(self.connection())
    }

    pub fn response_repo(&self) -> ResponseRepository {
        ResponseRepository::new(self.connection())
    }
}

/// WAL lets readers proceed alongside a writer; the busy timeout bounds how
/// long a writer waits for another process before failing as busy.
fn configure(conn: &Connection, busy_timeout: Duration) -> StoreResult<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    })?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}
