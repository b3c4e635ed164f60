//! SQLite persistence (infrastructure).

pub mod database;
pub mod repository;
pub mod schema;

pub use database::Database;
pub use repository::{
    CommitRepository, JobRepository, RepoRepository, ResponseRepository, ReviewRepository,
};
pub use schema::CURRENT_SCHEMA_VERSION;
