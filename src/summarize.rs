//! Summarization service: diffs and file contents in, short summaries and
//! embeddings out.
//!
//! Summaries are best effort. A diff that cannot be summarized yields
//! [`SUMMARY_FAILED`]; a file that cannot be summarized yields an empty
//! string ("no summary available"). Neither is raised as an error, so the
//! pipelines can still persist what they have.

use std::sync::Arc;

use anyhow::Result;

use crate::embedding::EmbeddingProvider;
use crate::llm::TextGenerator;
use crate::retry::{retry, RetryPolicy};

/// Placeholder stored when a diff could not be summarized.
pub const SUMMARY_FAILED: &str = "generation failed";

/// Placeholder stored when a commit's diff could not be fetched.
pub const DIFF_UNAVAILABLE: &str = "Error fetching commit details";

const DIFF_PROMPT_HEADER: &str = r#"You are an expert programmer summarizing a git diff.
Write a concise summary of the change in one or two lines. Where it fits, start
with a conventional prefix such as "Feat:", "Fix:", "Refactor:", "Docs:",
"Style:", "Chore:", or "Perf:". Do not repeat file headers or index lines.

Example input:
```diff
diff --git a/src/calculator.js b/src/calculator.js
index 123..456 100644
--- a/src/calculator.js
+++ b/src/calculator.js
@@ -5,7 +5,7 @@
   if (typeof a !== 'number' || typeof b !== 'number') {
-    throw new Error('Inputs must be numbers');
+    throw new TypeError('Invalid input: Both arguments must be numeric.');
   }
```
Example output:
Fix: Throw TypeError with a clearer message for non-numeric divide inputs.

Example input:
```diff
diff --git a/src/utils/parser.js b/src/utils/parser.js
index abc..def 100644
--- a/src/utils/parser.js
+++ b/src/utils/parser.js
@@ -1,5 +1,5 @@
-function parseNumericValue(str) {
+function parseNumericValue(str, strict = false) {
   const num = parseFloat(str);
@@ -7,5 +7,8 @@
-    return null;
+    if (strict) {
+        return null;
+    }
```
Example output:
Feat: Add optional strict mode to parseNumericValue.
Strict mode rejects strings with trailing non-numeric characters.

Now summarize this diff:
"#;

/// Build the few-shot prompt for a diff. The diff is passed through whole.
pub fn diff_prompt(diff: &str) -> String {
    format!("{}```diff\n{}\n```\n\nSummary:\n", DIFF_PROMPT_HEADER, diff)
}

/// Build the prompt for one file, given the (already truncated) content.
pub fn file_prompt(path: &str, content: &str) -> String {
    format!(
        "You are a senior engineer onboarding a junior engineer to a codebase.\n\
         Explain the purpose of the file `{}` in no more than 100 words.\n\n\
         ---\n{}\n---\n",
        path, content
    )
}

/// The first `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Produces summaries through a [`TextGenerator`] and vectors through an
/// [`EmbeddingProvider`].
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    content_chars: usize,
}

impl Summarizer {
    /// `content_chars` bounds how much of each file is sent to the model.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        content_chars: usize,
    ) -> Self {
        Self {
            generator,
            embedder,
            retry,
            content_chars,
        }
    }

    /// Summarize a commit diff, or return [`SUMMARY_FAILED`].
    pub async fn summarize_diff(&self, diff: &str) -> String {
        let prompt = diff_prompt(diff);
        match retry(&self.retry, "summarize diff", || self.generator.generate(&prompt)).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "diff summary unavailable; storing placeholder");
                SUMMARY_FAILED.to_string()
            }
        }
    }

    /// Summarize the leading `content_chars` characters of a file, or return
    /// an empty string.
    pub async fn summarize_file(&self, path: &str, content: &str) -> String {
        let prompt = file_prompt(path, truncate_chars(content, self.content_chars));
        let label = format!("summarize {}", path);
        match retry(&self.retry, &label, || self.generator.generate(&prompt)).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(path, error = %e, "file summary unavailable");
                String::new()
            }
        }
    }

    /// Embed a summary. Single attempt; callers wrap this in [`retry`].
    pub async fn embed(&self, summary: &str) -> Result<Vec<f32>> {
        self.embedder.embed(summary).await
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        reply: Option<String>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("model unavailable"))
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5, 0.5])
        }
    }

    fn summarizer(reply: Option<&str>) -> (Arc<RecordingGenerator>, Summarizer) {
        let generator = Arc::new(RecordingGenerator {
            prompts: Mutex::new(Vec::new()),
            reply: reply.map(str::to_string),
        });
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            rate_limit_cooldown: Duration::from_millis(1),
            max_rate_limit_wait: None,
        };
        let s = Summarizer::new(generator.clone(), Arc::new(FixedEmbedder), policy, 1000);
        (generator, s)
    }

    #[test]
    fn test_truncate_chars_on_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_diff_prompt_embeds_full_diff() {
        let diff = "+".repeat(5000);
        let prompt = diff_prompt(&diff);
        assert!(prompt.contains(&diff));
        assert!(prompt.contains("Example output"));
    }

    #[tokio::test]
    async fn test_file_summary_sees_only_prefix() {
        let (generator, s) = summarizer(Some("Entry point."));
        let content = format!("{}{}", "a".repeat(1000), "TAIL");
        let summary = s.summarize_file("src/main.rs", &content).await;
        assert_eq!(summary, "Entry point.");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("src/main.rs"));
        assert!(!prompts[0].contains("TAIL"));
    }

    #[tokio::test]
    async fn test_failed_diff_summary_is_sentinel() {
        let (generator, s) = summarizer(None);
        assert_eq!(s.summarize_diff("diff --git a b").await, SUMMARY_FAILED);
        assert_eq!(generator.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_file_summary_is_empty() {
        let (_generator, s) = summarizer(None);
        assert_eq!(s.summarize_file("a.rs", "fn main() {}").await, "");
    }

    #[tokio::test]
    async fn test_embed_passes_through() {
        let (_generator, s) = summarizer(Some("x"));
        assert_eq!(s.embed("x").await.unwrap(), vec![0.5, 0.5]);
        assert_eq!(s.embedding_model(), "fixed");
    }
}
