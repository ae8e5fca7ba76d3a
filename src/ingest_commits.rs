//! Commit ingestion pipeline.
//!
//! Discovers commits the store has not seen, summarizes each diff, and
//! persists one record per commit. Commits are processed one at a time
//! with a short pause between them, so a single run never has more than
//! one request in flight against the hosting API.
//!
//! Each commit moves through [`CommitStage`]s:
//!
//! ```text
//! Discovered → DiffFetched → Summarized → Persisted
//!      └───────────┴────────────┴──────→ Failed
//! ```
//!
//! A commit whose diff or summary fails is still persisted, carrying a
//! placeholder summary ([`DIFF_UNAVAILABLE`] or [`SUMMARY_FAILED`]). Only
//! setup failures (bad URL, unreachable or empty repository) abort a run.

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::github::RepoRef;
use crate::ingest::Ingestor;
use crate::models::{CommitInfo, CommitRecord, NewCommit, Project};
use crate::retry::{retry, RetryError};
use crate::summarize::{DIFF_UNAVAILABLE, SUMMARY_FAILED};

/// Where a commit is in the pipeline. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    Discovered,
    DiffFetched,
    Summarized,
    Persisted,
    Failed,
}

impl CommitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStage::Discovered => "discovered",
            CommitStage::DiffFetched => "diff_fetched",
            CommitStage::Summarized => "summarized",
            CommitStage::Persisted => "persisted",
            CommitStage::Failed => "failed",
        }
    }
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commits whose hash is not in `known`, in their original order.
pub fn unprocessed_commits(commits: Vec<CommitInfo>, known: &HashSet<String>) -> Vec<CommitInfo> {
    commits
        .into_iter()
        .filter(|c| !known.contains(&c.hash))
        .collect()
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

impl Ingestor {
    /// Ingest every commit of `project` not already in the store.
    ///
    /// Returns the records created by this run, placeholders included.
    /// Running it again right after a successful run creates nothing.
    pub async fn poll_commits(&self, project: &Project) -> Result<Vec<CommitRecord>> {
        let repo = RepoRef::parse(&project.github_url)?;
        let token = project.github_token.as_deref();

        let commits = retry(&self.retry, "list commits", || self.host.list_commits(&repo, token))
            .await
            .map_err(RetryError::into_last_error)?;
        let known = self.store.find_commit_hashes(&project.id).await?;
        let total = commits.len();
        let unprocessed = unprocessed_commits(commits, &known);

        info!(
            project = %project.name,
            repo = %repo,
            listed = total,
            new = unprocessed.len(),
            "polling commits"
        );

        let mut created = Vec::with_capacity(unprocessed.len());
        for (i, commit) in unprocessed.into_iter().enumerate() {
            if i > 0 && !self.commit_delay.is_zero() {
                tokio::time::sleep(self.commit_delay).await;
            }
            if let Some(record) = self.ingest_commit(project, &repo, commit).await {
                created.push(record);
            }
        }

        info!(project = %project.name, created = created.len(), "commit poll complete");
        Ok(created)
    }

    /// Run one commit through the stages. Never fails the batch: a store
    /// error is logged and the commit is left for the next poll.
    async fn ingest_commit(
        &self,
        project: &Project,
        repo: &RepoRef,
        info: CommitInfo,
    ) -> Option<CommitRecord> {
        let hash = info.hash.clone();
        let commit = short_hash(&hash);
        debug!(commit, stage = %CommitStage::Discovered, "new commit");

        let label = format!("diff {}", commit);
        let token = project.github_token.as_deref();
        let summary = match retry(&self.retry, &label, || self.host.commit_diff(repo, &hash, token)).await {
            Ok(diff) => {
                debug!(commit, stage = %CommitStage::DiffFetched, bytes = diff.len(), "diff fetched");
                let summary = self.summarizer.summarize_diff(&diff).await;
                if summary == SUMMARY_FAILED {
                    warn!(commit, stage = %CommitStage::Failed, "summary placeholder stored");
                } else {
                    debug!(commit, stage = %CommitStage::Summarized, "diff summarized");
                }
                summary
            }
            Err(e) => {
                warn!(commit, stage = %CommitStage::Failed, error = %e, "diff unavailable");
                DIFF_UNAVAILABLE.to_string()
            }
        };

        let new_commit = NewCommit {
            project_id: project.id.clone(),
            info,
            summary,
        };
        match self.store.create_commit(&new_commit).await {
            Ok(record) => {
                info!(commit, stage = %CommitStage::Persisted, "commit ingested");
                Some(record)
            }
            Err(e) => {
                warn!(
                    commit,
                    stage = %CommitStage::Failed,
                    error = %format!("{:#}", e),
                    "could not persist commit"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(hash: &str) -> CommitInfo {
        CommitInfo {
            hash: hash.to_string(),
            message: String::new(),
            author_name: String::new(),
            author_avatar: String::new(),
            authored_at: None,
        }
    }

    #[test]
    fn test_unprocessed_keeps_order() {
        let known: HashSet<String> = ["b".to_string()].into_iter().collect();
        let left = unprocessed_commits(vec![info("c"), info("b"), info("a")], &known);
        let hashes: Vec<&str> = left.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c", "a"]);
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "0123456");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(CommitStage::DiffFetched.to_string(), "diff_fetched");
        assert_eq!(CommitStage::Failed.as_str(), "failed");
    }
}
