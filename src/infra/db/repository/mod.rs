//! Repository implementations for data access.
//!
//! One repository per table family: repos, commits, the job queue, reviews
//! and responses. All of them share the connection owned by `Database`.

mod commit;
mod job;
mod repo;
mod response;
mod review;

pub use commit::CommitRepository;
pub use job::JobRepository;
pub use repo::RepoRepository;
pub use response::ResponseRepository;
pub use review::ReviewRepository;

use crate::domain::{StoreError, StoreResult};
use chrono::Utc;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

pub type DbConn = Arc<Mutex<Connection>>;

pub(crate) fn lock(conn: &DbConn) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| StoreError::LockPoisoned)
}

/// Current time in the text form stored in every timestamp column.
pub(super) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
