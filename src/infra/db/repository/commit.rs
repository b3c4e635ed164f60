use super::{DbConn, lock, now_rfc3339};
use crate::domain::{Commit, CommitId, RepoId, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

const COMMIT_COLUMNS: &str = "id, repo_id, sha, author, subject, timestamp, created_at";

/// Repository for commit metadata, keyed globally by hash.
pub struct CommitRepository {
    conn: DbConn,
}

impl CommitRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    /// Return the commit stored under `sha`, storing it first if needed.
    ///
    /// An existing row wins even if it belongs to another repo: hashes are
    /// unique across the whole store.
    pub fn get_or_create(
        &self,
        repo_id: RepoId,
        sha: &str,
        author: &str,
        subject: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Commit> {
        let conn = lock(&self.conn)?;

        if let Some(commit) = Self::select_by_sha(&conn, sha)? {
            return Ok(commit);
        }

        conn.execute(
            r#"
            INSERT INTO commits (repo_id, sha, author, subject, timestamp, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(sha) DO NOTHING
            "#,
            rusqlite::params![
                repo_id,
                sha,
                author,
                subject,
                timestamp.to_rfc3339(),
                now_rfc3339()
            ],
        )?;

        conn.query_row(
            &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE sha = ?1"),
            [sha],
            Self::row_to_commit,
        )
        .map_err(Into::into)
    }

    pub fn find_by_sha(&self, sha: &str) -> StoreResult<Option<Commit>> {
        let conn = lock(&self.conn)?;
        Self::select_by_sha(&conn, sha)
    }

    pub fn find_by_id(&self, id: CommitId) -> StoreResult<Option<Commit>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1"),
            [id],
            Self::row_to_commit,
        )
        .optional()
        .map_err(Into::into)
    }

    fn select_by_sha(conn: &Connection, sha: &str) -> StoreResult<Option<Commit>> {
        conn.query_row(
            &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE sha = ?1"),
            [sha],
            Self::row_to_commit,
        )
        .optional()
        .map_err(Into::into)
    }

    fn row_to_commit(row: &Row) -> rusqlite::Result<Commit> {
        Ok(Commit {
            id: row.get(0)?,
            repo_id: row.get(1)?,
            sha: row.get(2)?,
            author: row.get(3)?,
            subject: row.get(4)?,
            timestamp: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}
