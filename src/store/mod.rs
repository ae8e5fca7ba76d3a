//! Persistence gateway for projects, commits, and indexed files.
//!
//! The [`Store`] trait is everything the pipelines read from or write to
//! storage. Implementations must be `Send + Sync`; content indexing calls
//! them from many concurrent tasks.
//!
//! - [`SqliteStore`]: production backend over `sqlx` (see [`crate::migrate`]).
//! - [`InMemoryStore`]: `RwLock`-guarded vectors for tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_project`](Store::create_project) | Register a repository |
//! | [`find_project`](Store::find_project) | Look up a project by id or name |
//! | [`find_commit_hashes`](Store::find_commit_hashes) | Hashes already persisted for a project |
//! | [`create_commit`](Store::create_commit) | Persist one summarized commit |
//! | [`create_commits`](Store::create_commits) | Persist a batch of commits atomically |
//! | [`create_file_content`](Store::create_file_content) | Insert a file row with its vector |
//! | [`upsert_file_content`](Store::upsert_file_content) | Replace rows for the same path |
//! | [`vector_search`](Store::vector_search) | Nearest files to a query vector |

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use uuid::Uuid;

use crate::models::{
    CommitRecord, FileContentRecord, FileMatch, NewCommit, NewFileContent, NewProject, Project,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a project and return it with its generated id. Names are unique.
    async fn create_project(&self, project: &NewProject) -> Result<Project>;

    /// Find a project by id, falling back to an exact name match.
    async fn find_project(&self, id_or_name: &str) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Hashes of every commit persisted for `project_id`.
    async fn find_commit_hashes(&self, project_id: &str) -> Result<HashSet<String>>;

    /// Persisted commits for a project, newest author timestamp first.
    async fn find_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>>;

    /// Insert one commit.
    ///
    /// A second commit with the same `(project, hash)` fails with
    /// [`RecapError::PersistenceConflict`](crate::error::RecapError::PersistenceConflict).
    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitRecord>;

    /// Insert several commits; either all are written or none are.
    async fn create_commits(&self, commits: &[NewCommit]) -> Result<Vec<CommitRecord>>;

    /// Insert a file row, then attach its embedding to the new row.
    ///
    /// One logical operation: backends that support transactions write the
    /// row and the vector atomically.
    async fn create_file_content(&self, file: &NewFileContent) -> Result<FileContentRecord>;

    /// Like [`create_file_content`](Store::create_file_content), but first
    /// removes existing rows for the same project and path.
    async fn upsert_file_content(&self, file: &NewFileContent) -> Result<FileContentRecord>;

    /// Every file row for a project, ordered by path then creation time.
    async fn find_file_contents(&self, project_id: &str) -> Result<Vec<FileContentRecord>>;

    /// Rows with embeddings ranked by cosine similarity to `query`, best first.
    async fn vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<FileMatch>>;
}

/// Rank `(path, summary, vector)` candidates against `query`.
pub(crate) fn rank_by_similarity<'a, I>(query: &[f32], candidates: I, limit: usize) -> Vec<FileMatch>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a [f32])>,
{
    let mut matches: Vec<FileMatch> = candidates
        .into_iter()
        .map(|(path, summary, vector)| FileMatch {
            path: path.to_string(),
            summary: summary.to_string(),
            score: crate::embedding::cosine_similarity(query, vector),
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    matches.truncate(limit);
    matches
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn project_record(project: &NewProject) -> Project {
    Project {
        id: Uuid::new_v4().to_string(),
        name: project.name.clone(),
        github_url: project.github_url.clone(),
        github_token: project.github_token.clone(),
        created_at: now(),
    }
}

pub(crate) fn commit_record(commit: &NewCommit) -> CommitRecord {
    CommitRecord {
        id: Uuid::new_v4().to_string(),
        project_id: commit.project_id.clone(),
        hash: commit.info.hash.clone(),
        message: commit.info.message.clone(),
        author_name: commit.info.author_name.clone(),
        author_avatar: commit.info.author_avatar.clone(),
        authored_at: commit.info.authored_at.map(|t| t.timestamp()),
        summary: Some(commit.summary.clone()),
        created_at: now(),
    }
}

pub(crate) fn file_record(file: &NewFileContent) -> FileContentRecord {
    FileContentRecord {
        id: Uuid::new_v4().to_string(),
        project_id: file.project_id.clone(),
        path: file.path.clone(),
        content: file.content.clone(),
        summary: file.summary.clone(),
        embedding: file.embedding.clone(),
        created_at: now(),
    }
}
