use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unique identifier for a registered repository
pub type RepoId = i64;

/// Unique identifier for a registered commit
pub type CommitId = i64;

/// A repository known to the queue, keyed by its filesystem root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repo {
    pub id: RepoId,
    /// Absolute root of the working tree. Globally unique.
    pub root_path: PathBuf,
    /// Display name, the last segment of `root_path`.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Repo {
    /// Derive the display name for a repository root.
    ///
    /// Falls back to the full path when it has no final segment (e.g. `/`).
    pub fn display_name(root_path: &Path) -> String {
        root_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.to_string_lossy().into_owned())
    }
}

/// Commit metadata. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub id: CommitId,
    pub repo_id: RepoId,
    /// Content hash; unique across the whole store, not per repository.
    pub sha: String,
    pub author: String,
    pub subject: String,
    /// Author timestamp.
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
