//! Question search over indexed files.
//!
//! Embeds a free-text question with the same provider used at indexing
//! time and returns the nearest file summaries by cosine similarity.

use anyhow::Result;

use crate::error::RecapError;
use crate::models::{FileMatch, Project};
use crate::store::Store;
use crate::summarize::Summarizer;

/// Files of `project` whose summaries are closest to `question`.
///
/// A blank question yields no results without calling the embedding
/// provider.
pub async fn search_files(
    summarizer: &Summarizer,
    store: &dyn Store,
    project: &Project,
    question: &str,
    limit: usize,
) -> Result<Vec<FileMatch>> {
    let question = question.trim();
    if question.is_empty() {
        return Ok(Vec::new());
    }
    if limit == 0 {
        return Err(RecapError::InvalidInput("search limit must be > 0".to_string()).into());
    }

    let query = summarizer.embed(question).await?;
    tracing::debug!(
        project = %project.name,
        model = summarizer.embedding_model(),
        dims = query.len(),
        "question embedded"
    );
    store.vector_search(&project.id, &query, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::llm::DisabledGenerator;
    use crate::models::{NewFileContent, NewProject};
    use crate::retry::RetryPolicy;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Maps text onto two axes: "database" and everything else.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("database") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    #[tokio::test]
    async fn test_search_returns_closest_file_first() {
        let store = InMemoryStore::new();
        let project = store
            .create_project(&NewProject {
                name: "widgets".to_string(),
                github_url: "acme/widgets".to_string(),
                github_token: None,
            })
            .await
            .unwrap();
        for (path, vector) in [("src/db.rs", vec![0.9, 0.1]), ("src/ui.rs", vec![0.1, 0.9])] {
            store
                .create_file_content(&NewFileContent {
                    project_id: project.id.clone(),
                    path: path.to_string(),
                    content: String::new(),
                    summary: format!("summary of {}", path),
                    embedding: Some(vector),
                })
                .await
                .unwrap();
        }

        let summarizer = Summarizer::new(
            Arc::new(DisabledGenerator),
            Arc::new(KeywordEmbedder),
            RetryPolicy::default(),
            1000,
        );

        let hits = search_files(&summarizer, &store, &project, "where is the database?", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/db.rs");

        let none = search_files(&summarizer, &store, &project, "   ", 5).await.unwrap();
        assert!(none.is_empty());
    }
}
