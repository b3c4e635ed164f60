use super::{DbConn, lock, now_rfc3339};
use crate::domain::{CommitId, Response, StoreResult};
use rusqlite::Row;

/// Append-only follow-up responses on reviewed commits.
pub struct ResponseRepository {
    conn: DbConn,
}

impl ResponseRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    pub fn add(&self, commit_id: CommitId, responder: &str, response: &str) -> StoreResult<Response> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            r#"
            INSERT INTO responses (commit_id, responder, response, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, commit_id, responder, response, created_at
            "#,
            rusqlite::params![commit_id, responder, response, now_rfc3339()],
            Self::row_to_response,
        )
        .map_err(Into::into)
    }

    /// Oldest first.
    pub fn list_for_commit(&self, commit_id: CommitId) -> StoreResult<Vec<Response>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, commit_id, responder, response, created_at
            FROM responses
            WHERE commit_id = ?1
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([commit_id], Self::row_to_response)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn row_to_response(row: &Row) -> rusqlite::Result<Response> {
        Ok(Response {
            id: row.get(0)?,
            commit_id: row.get(1)?,
            responder: row.get(2)?,
            response: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
