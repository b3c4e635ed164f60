use super::{DbConn, lock};
use crate::domain::{JobId, Review, StoreResult};
use rusqlite::{OptionalExtension, Row};

/// Read access to stored reviews. Reviews are only written by
/// `JobRepository::complete`.
pub struct ReviewRepository {
    conn: DbConn,
}

impl ReviewRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    /// Review from the most recently finished `done` job for the commit `sha`.
    /// Finish times are compared as instants, so rows written with other UTC
    /// offsets still order correctly.
    pub fn find_by_commit_sha(&self, sha: &str) -> StoreResult<Option<Review>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            r#"
            SELECT r.id, r.job_id, r.agent, r.prompt, r.output, r.created_at
            FROM reviews r
            JOIN review_jobs j ON j.id = r.job_id
            JOIN commits c ON c.id = j.commit_id
            WHERE c.sha = ?1 AND j.status = 'done'
            ORDER BY julianday(j.finished_at) DESC, j.id DESC
            LIMIT 1
            "#,
            [sha],
            Self::row_to_review,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn find_by_job_id(&self, job_id: JobId) -> StoreResult<Option<Review>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            "SELECT id, job_id, agent, prompt, output, created_at FROM reviews WHERE job_id = ?1",
            [job_id],
            Self::row_to_review,
        )
        .optional()
        .map_err(Into::into)
    }

    pub(super) fn row_to_review(row: &Row) -> rusqlite::Result<Review> {
        Ok(Review {
            id: row.get(0)?,
            job_id: row.get(1)?,
            agent: row.get(2)?,
            prompt: row.get(3)?,
            output: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
