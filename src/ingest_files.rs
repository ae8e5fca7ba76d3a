//! Repository content indexing pipeline.
//!
//! Loads the default branch's file tree (blob fetches are capped by the
//! source host), then summarizes, embeds, and persists every file
//! concurrently. A file that fails any step is recorded in the
//! [`IndexReport`] and does not affect its siblings.
//!
//! By default a failed file leaves no row behind. With
//! `ingest.persist_failed_files` a placeholder row without an embedding is
//! written instead, so the run stays auditable from the store alone.

use anyhow::{anyhow, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ReindexPolicy;
use crate::error::RecapError;
use crate::github::RepoRef;
use crate::ingest::Ingestor;
use crate::models::{FileContentRecord, NewFileContent, Project, RepoFile};
use crate::retry::{retry, RetryError};
use crate::summarize::SUMMARY_FAILED;

/// Outcome of one indexing run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexReport {
    pub files_seen: usize,
    pub indexed: usize,
    pub failed: Vec<FileFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

impl Ingestor {
    /// Index every non-ignored file on the repository's default branch.
    ///
    /// `token` overrides the project's stored access token for this run.
    /// Only failing to load the tree is an error; per-file failures are
    /// collected in the report.
    pub async fn index_repository(
        &self,
        project: &Project,
        token: Option<&str>,
    ) -> Result<IndexReport> {
        let repo = RepoRef::parse(&project.github_url)?;
        let token = token.or(project.github_token.as_deref());

        let files = retry(&self.retry, "load file tree", || {
            self.host.list_file_tree(&repo, token)
        })
        .await
        .map_err(RetryError::into_last_error)?;

        info!(project = %project.name, repo = %repo, files = files.len(), "indexing files");

        let outcomes = join_all(files.iter().map(|file| self.index_file(project, file))).await;

        let mut report = IndexReport {
            files_seen: files.len(),
            ..Default::default()
        };
        for (file, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Ok(_) => report.indexed += 1,
                Err(e) => report.failed.push(FileFailure {
                    path: file.path.clone(),
                    reason: format!("{:#}", e),
                }),
            }
        }

        info!(
            project = %project.name,
            indexed = report.indexed,
            failed = report.failed.len(),
            "indexing complete"
        );
        Ok(report)
    }

    /// Summarize, embed, and persist one file.
    async fn index_file(&self, project: &Project, file: &RepoFile) -> Result<FileContentRecord> {
        let summary = self.summarizer.summarize_file(&file.path, &file.content).await;

        let embedded = if summary.is_empty() {
            Err(anyhow!(RecapError::GenerationFailure(
                "no summary available".to_string()
            )))
        } else {
            let label = format!("embed {}", file.path);
            retry(&self.retry, &label, || self.summarizer.embed(&summary))
                .await
                .map_err(anyhow::Error::from)
        };

        let error = match embedded {
            Ok(vector) => {
                return self
                    .persist_file(NewFileContent {
                        project_id: project.id.clone(),
                        path: file.path.clone(),
                        content: file.content.clone(),
                        summary,
                        embedding: Some(vector),
                    })
                    .await
                    .map_err(|e| {
                        warn!(path = %file.path, error = %format!("{:#}", e), "could not persist file");
                        e
                    });
            }
            Err(e) => e,
        };

        warn!(path = %file.path, error = %format!("{:#}", error), "file not indexed");
        if self.persist_failed_files {
            let placeholder = if summary.is_empty() {
                SUMMARY_FAILED.to_string()
            } else {
                summary
            };
            self.persist_file(NewFileContent {
                project_id: project.id.clone(),
                path: file.path.clone(),
                content: file.content.clone(),
                summary: placeholder,
                embedding: None,
            })
            .await?;
        }
        Err(error)
    }

    async fn persist_file(&self, file: NewFileContent) -> Result<FileContentRecord> {
        match self.reindex {
            ReindexPolicy::Append => self.store.create_file_content(&file).await,
            ReindexPolicy::Upsert => self.store.upsert_file_content(&file).await,
        }
    }
}
