//! Core data models used throughout Repo Recap.
//!
//! These types represent the projects, commits, and indexed files that flow
//! through the two ingestion pipelines and into the store.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered repository.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub github_url: String,
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    pub created_at: i64,
}

/// Input for [`Store::create_project`](crate::store::Store::create_project).
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub github_url: String,
    pub github_token: Option<String>,
}

/// Commit metadata as reported by the source host, before summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: String,
    pub authored_at: Option<DateTime<Utc>>,
}

/// A commit ready to be persisted with its generated summary.
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub project_id: String,
    pub info: CommitInfo,
    pub summary: String,
}

/// A persisted commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitRecord {
    pub id: String,
    pub project_id: String,
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: String,
    /// Author timestamp (unix seconds), when the host reported one.
    pub authored_at: Option<i64>,
    pub summary: Option<String>,
    pub created_at: i64,
}

/// A file loaded from the repository tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
}

/// A file ready to be persisted with its summary and embedding.
#[derive(Debug, Clone)]
pub struct NewFileContent {
    pub project_id: String,
    pub path: String,
    pub content: String,
    pub summary: String,
    /// `None` only for placeholder rows written for failed files.
    pub embedding: Option<Vec<f32>>,
}

/// A persisted file row.
#[derive(Debug, Clone, Serialize)]
pub struct FileContentRecord {
    pub id: String,
    pub project_id: String,
    pub path: String,
    pub content: String,
    pub summary: String,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
}

/// A file returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct FileMatch {
    pub path: String,
    pub summary: String,
    pub score: f32,
}
