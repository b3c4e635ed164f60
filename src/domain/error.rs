//! Error types for the review queue.
//!
//! Lookups that find nothing return `Ok(None)` rather than an error, and
//! uniqueness conflicts inside get-or-create are resolved by re-reading the
//! existing row, so neither shows up here.

use super::{JobId, JobStatus};
use rusqlite::ErrorCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to prepare database location {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Migration from schema version {from_version} failed: {source}")]
    Migration {
        from_version: i64,
        #[source]
        source: Box<StoreError>,
    },

    #[error("No migration path from schema version {0}")]
    UnknownSchemaVersion(i64),

    /// Lock contention outlasted the busy timeout. Safe to retry.
    #[error("Database is busy: {0}")]
    Busy(#[source] rusqlite::Error),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Invalid stored job status: {0}")]
    InvalidStatus(String),

    #[error("Foreign key violations after migration: {0}")]
    ForeignKeyViolation(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl StoreError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Busy(_) => true,
            StoreError::Migration { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StoreError::Busy(err)
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_errors_are_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = StoreError::from(busy);
        assert!(matches!(err, StoreError::Busy(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_sqlite_errors_are_not_retryable() {
        let err = StoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert!(!err.is_retryable());

        let err = StoreError::JobNotFound(7);
        assert_eq!(err.to_string(), "Job not found: 7");
        assert!(!err.is_retryable());
    }
}
