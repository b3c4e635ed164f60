//! Domain types for the review queue.
//! Repositories, commits, review jobs and their outcomes as plain data.

pub mod error;
pub mod job;
pub mod repo;
pub mod review;

pub use error::*;
pub use job::*;
pub use repo::*;
pub use review::*;
