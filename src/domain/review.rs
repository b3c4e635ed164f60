use super::{CommitId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a stored review
pub type ReviewId = i64;

/// Unique identifier for a follow-up response
pub type ResponseId = i64;

/// The outcome of a completed job. Exactly one per `done` job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Review {
    pub id: ReviewId,
    pub job_id: JobId,
    /// Agent that produced the output.
    pub agent: String,
    /// Prompt handed to the agent.
    pub prompt: String,
    pub output: String,
    pub created_at: DateTime<Utc>,
}

/// A human or agent reaction to a reviewed commit. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub id: ResponseId,
    pub commit_id: CommitId,
    pub responder: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}
