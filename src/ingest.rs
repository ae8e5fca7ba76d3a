//! Shared pipeline context.
//!
//! An [`Ingestor`] bundles the collaborators both pipelines need: the
//! source host, the summarization service, and the store. It is built
//! once per run, either from explicit parts (tests inject doubles here)
//! or from a [`Config`] via [`Ingestor::from_config`].
//!
//! The pipelines themselves live in [`crate::ingest_commits`] and
//! [`crate::ingest_files`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::{Config, ReindexPolicy};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::github::{GithubClient, RepoRef, SourceHost};
use crate::llm::{create_generator, TextGenerator};
use crate::models::{NewProject, Project};
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::summarize::Summarizer;

pub struct Ingestor {
    pub(crate) host: Arc<dyn SourceHost>,
    pub(crate) summarizer: Arc<Summarizer>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) retry: RetryPolicy,
    pub(crate) commit_delay: Duration,
    pub(crate) reindex: ReindexPolicy,
    pub(crate) persist_failed_files: bool,
}

impl Ingestor {
    /// Assemble an ingestor from explicit parts.
    ///
    /// Defaults: no inter-commit delay, append-only re-indexing, and
    /// failed files are dropped. Adjust with the `with_*` methods.
    pub fn new(
        host: Arc<dyn SourceHost>,
        summarizer: Arc<Summarizer>,
        store: Arc<dyn Store>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            host,
            summarizer,
            store,
            retry,
            commit_delay: Duration::ZERO,
            reindex: ReindexPolicy::Append,
            persist_failed_files: false,
        }
    }

    /// Build the production wiring: GitHub client, configured model
    /// providers, and the given store.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);
        let host = GithubClient::new(&config.github, retry.clone())?;
        let generator: Arc<dyn TextGenerator> = Arc::from(create_generator(&config.llm)?);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let summarizer = Summarizer::new(
            generator,
            embedder,
            retry.clone(),
            config.ingest.summary_chars,
        );

        Ok(Self::new(Arc::new(host), Arc::new(summarizer), store, retry)
            .with_commit_delay(Duration::from_millis(config.ingest.commit_delay_ms))
            .with_reindex(config.ingest.reindex)
            .with_persist_failed_files(config.ingest.persist_failed_files))
    }

    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    pub fn with_reindex(mut self, policy: ReindexPolicy) -> Self {
        self.reindex = policy;
        self
    }

    /// Write placeholder rows (no embedding) for files that fail to index.
    pub fn with_persist_failed_files(mut self, enabled: bool) -> Self {
        self.persist_failed_files = enabled;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }
}

/// Validate the repository URL and register a project.
///
/// A malformed URL is rejected with
/// [`RecapError::InvalidInput`](crate::error::RecapError::InvalidInput)
/// before anything is written.
pub async fn add_project(store: &dyn Store, project: NewProject) -> Result<Project> {
    let repo = RepoRef::parse(&project.github_url)?;
    let created = store.create_project(&project).await?;
    tracing::info!(project = %created.name, repo = %repo, "project registered");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecapError;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_add_project_accepts_git_suffix() {
        let store = InMemoryStore::new();
        let project = add_project(
            &store,
            NewProject {
                name: "widgets".to_string(),
                github_url: "https://github.com/acme/widgets.git/".to_string(),
                github_token: None,
            },
        )
        .await
        .unwrap();
        let repo = RepoRef::parse(&project.github_url).unwrap();
        assert_eq!((repo.owner.as_str(), repo.name.as_str()), ("acme", "widgets"));
        assert_eq!(store.find_project("widgets").await.unwrap().unwrap().id, project.id);
    }

    #[tokio::test]
    async fn test_add_project_rejects_bad_url_before_writing() {
        let store = InMemoryStore::new();
        let err = add_project(
            &store,
            NewProject {
                name: "broken".to_string(),
                github_url: "https://github.com/acme".to_string(),
                github_token: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecapError>(),
            Some(RecapError::InvalidInput(_))
        ));
        assert!(store.list_projects().await.unwrap().is_empty());
    }
}
