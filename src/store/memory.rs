//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over all stored vectors.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use crate::error::RecapError;
use crate::models::{
    CommitRecord, FileContentRecord, FileMatch, NewCommit, NewFileContent, NewProject, Project,
};

use super::{commit_record, file_record, project_record, rank_by_similarity, Store};

/// In-memory store for tests.
pub struct InMemoryStore {
    projects: RwLock<Vec<Project>>,
    commits: RwLock<Vec<CommitRecord>>,
    files: RwLock<Vec<FileContentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(Vec::new()),
            commits: RwLock::new(Vec::new()),
            files: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict(commit: &NewCommit) -> anyhow::Error {
    RecapError::PersistenceConflict(format!(
        "commit {} already stored for project {}",
        commit.info.hash, commit.project_id
    ))
    .into()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_project(&self, project: &NewProject) -> Result<Project> {
        let mut projects = self.projects.write().unwrap();
        if projects.iter().any(|p| p.name == project.name) {
            return Err(RecapError::PersistenceConflict(format!(
                "project {} already exists",
                project.name
            ))
            .into());
        }
        let stored = project_record(project);
        projects.push(stored.clone());
        Ok(stored)
    }

    async fn find_project(&self, id_or_name: &str) -> Result<Option<Project>> {
        let projects = self.projects.read().unwrap();
        Ok(projects
            .iter()
            .find(|p| p.id == id_or_name)
            .or_else(|| projects.iter().find(|p| p.name == id_or_name))
            .cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.read().unwrap().clone())
    }

    async fn find_commit_hashes(&self, project_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .commits
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.project_id == project_id)
            .map(|c| c.hash.clone())
            .collect())
    }

    async fn find_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>> {
        let mut commits: Vec<CommitRecord> = self
            .commits
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        commits.sort_by(|a, b| b.authored_at.cmp(&a.authored_at));
        Ok(commits)
    }

    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitRecord> {
        let mut commits = self.commits.write().unwrap();
        if commits
            .iter()
            .any(|c| c.project_id == commit.project_id && c.hash == commit.info.hash)
        {
            return Err(conflict(commit));
        }
        let record = commit_record(commit);
        commits.push(record.clone());
        Ok(record)
    }

    async fn create_commits(&self, batch: &[NewCommit]) -> Result<Vec<CommitRecord>> {
        let mut commits = self.commits.write().unwrap();
        let mut seen: HashSet<(&str, &str)> = commits
            .iter()
            .map(|c| (c.project_id.as_str(), c.hash.as_str()))
            .collect();
        for commit in batch {
            if !seen.insert((commit.project_id.as_str(), commit.info.hash.as_str())) {
                return Err(conflict(commit));
            }
        }
        drop(seen);

        let records: Vec<CommitRecord> = batch.iter().map(commit_record).collect();
        commits.extend(records.iter().cloned());
        Ok(records)
    }

    async fn create_file_content(&self, file: &NewFileContent) -> Result<FileContentRecord> {
        let record = file_record(file);
        self.files.write().unwrap().push(record.clone());
        Ok(record)
    }

    async fn upsert_file_content(&self, file: &NewFileContent) -> Result<FileContentRecord> {
        let record = file_record(file);
        let mut files = self.files.write().unwrap();
        files.retain(|f| !(f.project_id == file.project_id && f.path == file.path));
        files.push(record.clone());
        Ok(record)
    }

    async fn find_file_contents(&self, project_id: &str) -> Result<Vec<FileContentRecord>> {
        let mut files: Vec<FileContentRecord> = self
            .files
            .read()
            .unwrap()
            .iter()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path).then(a.created_at.cmp(&b.created_at)));
        Ok(files)
    }

    async fn vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<FileMatch>> {
        let files = self.files.read().unwrap();
        let candidates = files
            .iter()
            .filter(|f| f.project_id == project_id)
            .filter_map(|f| {
                f.embedding
                    .as_deref()
                    .map(|v| (f.path.as_str(), f.summary.as_str(), v))
            });
        Ok(rank_by_similarity(query, candidates, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommitInfo;

    fn new_commit(project_id: &str, hash: &str) -> NewCommit {
        NewCommit {
            project_id: project_id.to_string(),
            info: CommitInfo {
                hash: hash.to_string(),
                message: format!("commit {}", hash),
                author_name: "Ada".to_string(),
                author_avatar: String::new(),
                authored_at: None,
            },
            summary: "summary".to_string(),
        }
    }

    fn new_file(path: &str, embedding: Option<Vec<f32>>) -> NewFileContent {
        NewFileContent {
            project_id: "p1".to_string(),
            path: path.to_string(),
            content: "content".to_string(),
            summary: format!("about {}", path),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_duplicate_commit_conflicts() {
        let store = InMemoryStore::new();
        store.create_commit(&new_commit("p1", "a")).await.unwrap();
        let err = store.create_commit(&new_commit("p1", "a")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecapError>(),
            Some(RecapError::PersistenceConflict(_))
        ));
        // Same hash in another project is fine.
        store.create_commit(&new_commit("p2", "a")).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_commits_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.create_commit(&new_commit("p1", "b")).await.unwrap();
        let batch = vec![new_commit("p1", "a"), new_commit("p1", "b")];
        assert!(store.create_commits(&batch).await.is_err());
        assert_eq!(store.find_commit_hashes("p1").await.unwrap().len(), 1);

        let batch = vec![new_commit("p1", "c"), new_commit("p1", "d")];
        let created = store.create_commits(&batch).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(store.find_commit_hashes("p1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_path() {
        let store = InMemoryStore::new();
        store.create_file_content(&new_file("a.rs", None)).await.unwrap();
        store.create_file_content(&new_file("a.rs", None)).await.unwrap();
        assert_eq!(store.find_file_contents("p1").await.unwrap().len(), 2);

        store.upsert_file_content(&new_file("a.rs", None)).await.unwrap();
        assert_eq!(store.find_file_contents("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_ranks_and_skips_missing_vectors() {
        let store = InMemoryStore::new();
        store
            .create_file_content(&new_file("near.rs", Some(vec![1.0, 0.1])))
            .await
            .unwrap();
        store
            .create_file_content(&new_file("far.rs", Some(vec![0.0, 1.0])))
            .await
            .unwrap();
        store.create_file_content(&new_file("none.rs", None)).await.unwrap();

        let hits = store.vector_search("p1", &[1.0, 0.0], 10).await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["near.rs", "far.rs"]);

        let top = store.vector_search("p1", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top.len(), 1);
    }

    #[tokio::test]
    async fn test_find_project_by_id_or_name() {
        let store = InMemoryStore::new();
        let project = store
            .create_project(&NewProject {
                name: "widgets".to_string(),
                github_url: "https://github.com/acme/widgets".to_string(),
                github_token: None,
            })
            .await
            .unwrap();
        assert_eq!(store.find_project(&project.id).await.unwrap().unwrap().name, "widgets");
        assert_eq!(store.find_project("widgets").await.unwrap().unwrap().id, project.id);
        assert!(store.find_project("nope").await.unwrap().is_none());
    }
}
