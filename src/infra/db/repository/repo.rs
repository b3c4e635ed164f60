use super::{DbConn, lock, now_rfc3339};
use crate::domain::{Repo, RepoId, StoreResult};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

pub struct RepoRepository {
    conn: DbConn,
}

impl RepoRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    /// Return the repo registered at `root_path`, registering it first if needed.
    ///
    /// Racing callers may both reach the insert; the loser's insert is a no-op
    /// on the unique `root_path` and it re-reads the winner's row.
    pub fn get_or_create(&self, root_path: impl AsRef<Path>) -> StoreResult<Repo> {
        let root_path = root_path.as_ref();
        let root = root_path.to_string_lossy().into_owned();
        let conn = lock(&self.conn)?;

        if let Some(repo) = Self::select_by_path(&conn, &root)? {
            return Ok(repo);
        }

        let name = Repo::display_name(root_path);
        let inserted = conn.execute(
            r#"
            INSERT INTO repos (root_path, name, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(root_path) DO NOTHING
            "#,
            rusqlite::params![root, name, now_rfc3339()],
        )?;
        if inserted == 1 {
            log::debug!("Registered repo {} at {}", name, root);
        }

        conn.query_row(
            "SELECT id, root_path, name, created_at FROM repos WHERE root_path = ?1",
            [&root],
            Self::row_to_repo,
        )
        .map_err(Into::into)
    }

    pub fn find_by_path(&self, root_path: impl AsRef<Path>) -> StoreResult<Option<Repo>> {
        let root = root_path.as_ref().to_string_lossy().into_owned();
        let conn = lock(&self.conn)?;
        Self::select_by_path(&conn, &root)
    }

    pub fn find_by_id(&self, id: RepoId) -> StoreResult<Option<Repo>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            "SELECT id, root_path, name, created_at FROM repos WHERE id = ?1",
            [id],
            Self::row_to_repo,
        )
        .optional()
        .map_err(Into::into)
    }

    fn select_by_path(conn: &Connection, root: &str) -> StoreResult<Option<Repo>> {
        conn.query_row(
            "SELECT id, root_path, name, created_at FROM repos WHERE root_path = ?1",
            [root],
            Self::row_to_repo,
        )
        .optional()
        .map_err(Into::into)
    }

    fn row_to_repo(row: &Row) -> rusqlite::Result<Repo> {
        Ok(Repo {
            id: row.get(0)?,
            root_path: PathBuf::from(row.get::<_, String>(1)?),
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
