//! Persistent work queue for automated commit review.
//!
//! Independent worker processes share one SQLite file. Collaborators register
//! repos and commits, enqueue review jobs, and workers claim, complete or fail
//! them. The database is the only point of coordination between workers.

pub mod domain;
pub mod infra;

pub use domain::{
    Commit, CommitId, JobCounts, JobId, JobStatus, Repo, RepoId, Response, ResponseId, Review,
    ReviewId, ReviewJob, StoreError, StoreResult,
};
pub use infra::app_config::{StoreConfig, load_config, save_config};
pub use infra::db::Database;
