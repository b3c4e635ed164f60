//! Schema definition and forward-only migrations.
//!
//! The stored version lives in `schema_version`, which always holds exactly one
//! row. Databases from before that table existed are recognised by the
//! `review_jobs.commit_sha` column and treated as version 1.

use crate::domain::{StoreError, StoreResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

const LEGACY_SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY,
    root_path TEXT UNIQUE NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS commits (
    id INTEGER PRIMARY KEY,
    repo_id INTEGER NOT NULL REFERENCES repos(id),
    sha TEXT UNIQUE NOT NULL,
    author TEXT NOT NULL,
    subject TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS review_jobs (
    id INTEGER PRIMARY KEY,
    repo_id INTEGER NOT NULL REFERENCES repos(id),
    commit_id INTEGER REFERENCES commits(id),
    git_ref TEXT NOT NULL,
    agent TEXT NOT NULL DEFAULT 'codex',
    status TEXT NOT NULL CHECK (status IN ('queued','running','done','failed')) DEFAULT 'queued',
    enqueued_at TEXT NOT NULL DEFAULT (datetime('now')),
    started_at TEXT,
    finished_at TEXT,
    worker_id TEXT,
    error TEXT
);

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY,
    job_id INTEGER UNIQUE NOT NULL REFERENCES review_jobs(id),
    agent TEXT NOT NULL,
    prompt TEXT NOT NULL,
    output TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS responses (
    id INTEGER PRIMARY KEY,
    commit_id INTEGER NOT NULL REFERENCES commits(id),
    responder TEXT NOT NULL,
    response TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_review_jobs_status ON review_jobs(status);
CREATE INDEX IF NOT EXISTS idx_review_jobs_repo ON review_jobs(repo_id);
CREATE INDEX IF NOT EXISTS idx_review_jobs_git_ref ON review_jobs(git_ref);
CREATE INDEX IF NOT EXISTS idx_commits_sha ON commits(sha);
"#;

/// A single forward step, applied inside its own transaction.
struct Migration {
    from: i64,
    description: &'static str,
    apply: fn(&Transaction<'_>) -> StoreResult<()>,
}

/// Ordered by `from`; each step moves the store from `from` to `from + 1`.
const MIGRATIONS: &[Migration] = &[Migration {
    from: 1,
    description: "rename review_jobs.commit_sha to git_ref",
    apply: rename_commit_sha_to_git_ref,
}];

/// Bring the schema up to [`CURRENT_SCHEMA_VERSION`].
///
/// Idempotent. Every step re-reads the version under a write lock, so
/// concurrent openers apply each step once. Foreign key enforcement is off
/// while steps run because a table rewrite drops a referenced table.
pub fn migrate(conn: &mut Connection) -> StoreResult<()> {
    conn.pragma_update(None, "foreign_keys", false)?;
    let result = run_migrations(conn);
    conn.pragma_update(None, "foreign_keys", true)?;
    result
}

fn run_migrations(conn: &mut Connection) -> StoreResult<()> {
    loop {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let version = detect_version(&tx)?;

        if version >= CURRENT_SCHEMA_VERSION {
            if version > CURRENT_SCHEMA_VERSION {
                log::warn!(
                    "Database schema version {} is newer than supported version {}",
                    version,
                    CURRENT_SCHEMA_VERSION
                );
            }
            return Ok(());
        }

        if version == 0 {
            install_schema(&tx).map_err(|source| migration_error(0, source))?;
            tx.commit()?;
            log::info!("Created schema version {}", CURRENT_SCHEMA_VERSION);
            return Ok(());
        }

        let step = MIGRATIONS
            .iter()
            .find(|m| m.from == version)
            .ok_or(StoreError::UnknownSchemaVersion(version))?;
        apply_step(tx, step).map_err(|source| migration_error(version, source))?;
        log::info!(
            "Migrated schema {} -> {}: {}",
            step.from,
            step.from + 1,
            step.description
        );
    }
}

fn migration_error(from_version: i64, source: StoreError) -> StoreError {
    StoreError::Migration {
        from_version,
        source: Box::new(source),
    }
}

fn install_schema(tx: &Transaction<'_>) -> StoreResult<()> {
    tx.execute_batch(SCHEMA)?;
    write_version(tx, CURRENT_SCHEMA_VERSION)
}

fn apply_step(tx: Transaction<'_>, step: &Migration) -> StoreResult<()> {
    (step.apply)(&tx)?;
    write_version(&tx, step.from + 1)?;
    tx.commit()?;
    Ok(())
}

fn detect_version(conn: &Connection) -> StoreResult<i64> {
    if has_column(conn, "review_jobs", "commit_sha")? {
        return Ok(LEGACY_SCHEMA_VERSION);
    }
    current_version(conn)
}

/// Stored schema version, or 0 when nothing has been recorded yet.
pub fn current_version(conn: &Connection) -> StoreResult<i64> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Replace whatever is stored with a single row.
fn write_version(conn: &Connection, version: i64) -> StoreResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2)",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Version 1 -> 2. Older SQLite has no `RENAME COLUMN`, so the job table is
/// rebuilt under the new column name and swapped into place.
fn rename_commit_sha_to_git_ref(tx: &Transaction<'_>) -> StoreResult<()> {
    // Legacy writers ran without foreign key enforcement, so dangling reviews
    // may already exist. Only the ones the rewrite would introduce are fatal.
    let dangling_before = foreign_key_violations(tx, "reviews")?;
    if !dangling_before.is_empty() {
        log::warn!(
            "Legacy database already has {} dangling review(s); keeping them",
            dangling_before.len()
        );
    }

    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);

        DROP TABLE IF EXISTS review_jobs_new;
        CREATE TABLE review_jobs_new (
            id INTEGER PRIMARY KEY,
            repo_id INTEGER NOT NULL REFERENCES repos(id),
            commit_id INTEGER REFERENCES commits(id),
            git_ref TEXT NOT NULL,
            agent TEXT NOT NULL DEFAULT 'codex',
            status TEXT NOT NULL CHECK (status IN ('queued','running','done','failed')) DEFAULT 'queued',
            enqueued_at TEXT NOT NULL DEFAULT (datetime('now')),
            started_at TEXT,
            finished_at TEXT,
            worker_id TEXT,
            error TEXT
        );

        INSERT INTO review_jobs_new (id, repo_id, commit_id, git_ref, agent, status, enqueued_at, started_at, finished_at, worker_id, error)
        SELECT id, repo_id, commit_id, commit_sha, agent, status, enqueued_at, started_at, finished_at, worker_id, error
        FROM review_jobs;

        DROP TABLE review_jobs;
        ALTER TABLE review_jobs_new RENAME TO review_jobs;
        "#,
    )?;

    // Recreates the job indexes and fills in any table the legacy layout lacked.
    tx.execute_batch(SCHEMA)?;

    let introduced: Vec<String> = foreign_key_violations(tx, "reviews")?
        .into_iter()
        .filter(|v| !dangling_before.contains(v))
        .map(|v| format!("{}[{}] -> {}", v.table, v.rowid, v.parent))
        .collect();
    if introduced.is_empty() {
        Ok(())
    } else {
        Err(StoreError::ForeignKeyViolation(introduced.join(", ")))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ForeignKeyViolation {
    table: String,
    rowid: i64,
    parent: String,
}

/// Rows of `table` whose foreign keys point nowhere. Empty when the table
/// does not exist.
fn foreign_key_violations(
    conn: &Connection,
    table: &str,
) -> StoreResult<Vec<ForeignKeyViolation>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_check({table})"))?;
    let violations = stmt
        .query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                parent: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_versions(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);

        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(count_versions(&conn), 1);
        assert!(has_column(&conn, "review_jobs", "git_ref").unwrap());
    }

    #[test]
    fn test_migrate_twice_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO repos (root_path, name) VALUES ('/tmp/a', 'a')",
            [],
        )
        .unwrap();

        migrate(&mut conn).unwrap();
        let repos: i64 = conn
            .query_row("SELECT COUNT(*) FROM repos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(repos, 1);
        assert_eq!(count_versions(&conn), 1);
    }

    #[test]
    fn test_write_version_collapses_duplicate_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
             INSERT INTO schema_version (version) VALUES (1), (2), (3);",
        )
        .unwrap();
        assert_eq!(current_version(&conn).unwrap(), 3);

        write_version(&conn, 2).unwrap();
        assert_eq!(count_versions(&conn), 1);
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_newer_database_is_left_alone() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        write_version(&conn, CURRENT_SCHEMA_VERSION + 5).unwrap();

        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION + 5);
    }

    #[test]
    fn test_migration_steps_are_contiguous() {
        for (i, step) in MIGRATIONS.iter().enumerate() {
            assert_eq!(step.from, LEGACY_SCHEMA_VERSION + i as i64);
        }
        let last = MIGRATIONS.last().unwrap();
        assert_eq!(last.from + 1, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_failed_step_leaves_legacy_table_intact() {
        let mut conn = Connection::open_in_memory().unwrap();
        // No CHECK on the legacy status column, so this row cannot be copied.
        conn.execute_batch(
            "CREATE TABLE review_jobs (
                 id INTEGER PRIMARY KEY,
                 repo_id INTEGER NOT NULL,
                 commit_id INTEGER NOT NULL,
                 commit_sha TEXT NOT NULL,
                 agent TEXT NOT NULL DEFAULT 'codex',
                 status TEXT NOT NULL DEFAULT 'queued',
                 enqueued_at TEXT NOT NULL DEFAULT (datetime('now')),
                 started_at TEXT,
                 finished_at TEXT,
                 worker_id TEXT,
                 error TEXT
             );
             INSERT INTO review_jobs (id, repo_id, commit_id, commit_sha, status)
             VALUES (1, 1, 1, 'abc123', 'paused');",
        )
        .unwrap();

        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::Migration { from_version: 1, .. }));

        assert!(has_column(&conn, "review_jobs", "commit_sha").unwrap());
        assert_eq!(current_version(&conn).unwrap(), 0);
        let leftovers: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'review_jobs_new'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_foreign_key_violations_lists_dangling_rows() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(foreign_key_violations(&conn, "reviews").unwrap().is_empty());

        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             CREATE TABLE review_jobs (id INTEGER PRIMARY KEY);
             CREATE TABLE reviews (id INTEGER PRIMARY KEY, job_id INTEGER REFERENCES review_jobs(id));
             INSERT INTO review_jobs (id) VALUES (1);
             INSERT INTO reviews (id, job_id) VALUES (1, 1), (2, 42);",
        )
        .unwrap();

        let violations = foreign_key_violations(&conn, "reviews").unwrap();
        assert_eq!(
            violations,
            vec![ForeignKeyViolation {
                table: "reviews".into(),
                rowid: 2,
                parent: "review_jobs".into(),
            }]
        );
    }
}
