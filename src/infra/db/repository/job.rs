use super::review::ReviewRepository;
use super::{DbConn, lock, now_rfc3339};
use crate::domain::{
    CommitId, JobCounts, JobId, JobStatus, RepoId, Review, ReviewJob, StoreError, StoreResult,
};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, TransactionBehavior};

const JOB_COLUMNS: &str = "id, repo_id, commit_id, git_ref, agent, status, enqueued_at, started_at, finished_at, worker_id, error";

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        raw.parse()
            .map_err(|_| FromSqlError::Other(Box::new(StoreError::InvalidStatus(raw.to_string()))))
    }
}

/// The job queue: enqueue, claim, and resolution of review jobs.
pub struct JobRepository {
    conn: DbConn,
}

impl JobRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    /// Add a `queued` job. Enqueuing the same ref twice yields two jobs.
    pub fn enqueue(
        &self,
        repo_id: RepoId,
        commit_id: Option<CommitId>,
        git_ref: &str,
        agent: &str,
    ) -> StoreResult<ReviewJob> {
        let conn = lock(&self.conn)?;
        let job = conn.query_row(
            &format!(
                r#"
                INSERT INTO review_jobs (repo_id, commit_id, git_ref, agent, status, enqueued_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                RETURNING {JOB_COLUMNS}
                "#
            ),
            rusqlite::params![
                repo_id,
                commit_id,
                git_ref,
                agent,
                JobStatus::Queued,
                now_rfc3339()
            ],
            Self::row_to_job,
        )?;
        log::debug!("Enqueued job {} for {} ({})", job.id, git_ref, agent);
        Ok(job)
    }

    /// Hand the oldest queued job to `worker_id`, or `None` if nothing is queued.
    ///
    /// Selection and the `queued -> running` write are one UPDATE statement, so
    /// SQLite's write lock makes the claim exclusive across connections and
    /// processes. The status guard in the outer WHERE keeps the compare-and-swap
    /// explicit.
    pub fn claim(&self, worker_id: &str) -> StoreResult<Option<ReviewJob>> {
        let conn = lock(&self.conn)?;
        let job = conn
            .query_row(
                &format!(
                    r#"
                    UPDATE review_jobs
                    SET status = 'running', worker_id = ?1, started_at = ?2
                    WHERE id = (
                        SELECT id FROM review_jobs
                        WHERE status = 'queued'
                        ORDER BY id
                        LIMIT 1
                    )
                    AND status = 'queued'
                    RETURNING {JOB_COLUMNS}
                    "#
                ),
                rusqlite::params![worker_id, now_rfc3339()],
                Self::row_to_job,
            )
            .optional()?;

        if let Some(job) = &job {
            log::debug!("Worker {} claimed job {} ({})", worker_id, job.id, job.git_ref);
        }
        Ok(job)
    }

    /// Finish a running job and store its review in the same transaction.
    pub fn complete(
        &self,
        job_id: JobId,
        agent: &str,
        prompt: &str,
        output: &str,
    ) -> StoreResult<Review> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_rfc3339();

        Self::finish(&tx, job_id, JobStatus::Done, None, &now)?;
        let review = tx.query_row(
            r#"
            INSERT INTO reviews (job_id, agent, prompt, output, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, job_id, agent, prompt, output, created_at
            "#,
            rusqlite::params![job_id, agent, prompt, output, now],
            ReviewRepository::row_to_review,
        )?;
        tx.commit()?;

        log::debug!("Job {} done by {}", job_id, agent);
        Ok(review)
    }

    /// Mark a running job failed with `error`.
    pub fn fail(&self, job_id: JobId, error: &str) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        Self::finish(&conn, job_id, JobStatus::Failed, Some(error), &now_rfc3339())?;
        log::debug!("Job {} failed: {}", job_id, error);
        Ok(())
    }

    /// Put every `running` job back in the queue.
    ///
    /// Meant for process startup after a crash. A worker that is merely slow
    /// loses its claim too, so its job may run twice.
    pub fn reset_stale_jobs(&self) -> StoreResult<usize> {
        let conn = lock(&self.conn)?;
        let reset = conn.execute(
            r#"
            UPDATE review_jobs
            SET status = 'queued', worker_id = NULL, started_at = NULL
            WHERE status = 'running'
            "#,
            [],
        )?;
        if reset > 0 {
            log::info!("Re-queued {} stale running job(s)", reset);
        }
        Ok(reset)
    }

    /// Counts per status, read in one statement so they always sum to the total.
    pub fn counts(&self) -> StoreResult<JobCounts> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM review_jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, JobStatus>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = JobCounts::default();
        for row in rows {
            let (status, count) = row?;
            counts.set(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    pub fn find_by_id(&self, job_id: JobId) -> StoreResult<Option<ReviewJob>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM review_jobs WHERE id = ?1"),
            [job_id],
            Self::row_to_job,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Most recently enqueued jobs first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> StoreResult<Vec<ReviewJob>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM review_jobs
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(rusqlite::params![status, limit], Self::row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// `running -> to`, or the reason the job could not make that move.
    fn finish(
        conn: &Connection,
        job_id: JobId,
        to: JobStatus,
        error: Option<&str>,
        now: &str,
    ) -> StoreResult<()> {
        let updated = conn.execute(
            r#"
            UPDATE review_jobs
            SET status = ?1, finished_at = ?2, error = ?3
            WHERE id = ?4 AND status = 'running'
            "#,
            rusqlite::params![to, now, error, job_id],
        )?;
        if updated == 1 {
            return Ok(());
        }

        let current: Option<JobStatus> = conn
            .query_row(
                "SELECT status FROM review_jobs WHERE id = ?1",
                [job_id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            None => Err(StoreError::JobNotFound(job_id)),
            Some(from) => Err(StoreError::InvalidTransition { job_id, from, to }),
        }
    }

    fn row_to_job(row: &Row) -> rusqlite::Result<ReviewJob> {
        Ok(ReviewJob {
            id: row.get(0)?,
            repo_id: row.get(1)?,
            commit_id: row.get(2)?,
            git_ref: row.get(3)?,
            agent: row.get(4)?,
            status: row.get(5)?,
            enqueued_at: row.get(6)?,
            started_at: row.get(7)?,
            finished_at: row.get(8)?,
            worker_id: row.get(9)?,
            error: row.get(10)?,
        })
    }
}
