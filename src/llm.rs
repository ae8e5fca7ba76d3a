//! Generative text providers.
//!
//! A [`TextGenerator`] answers a single prompt with text, with no
//! conversation state. Implementations:
//! - **[`DisabledGenerator`]**: returns errors; used when no model is configured.
//! - **[`GeminiGenerator`]**: `POST /v1beta/models/{model}:generateContent`.
//! - **[`OpenAIGenerator`]**: `POST /v1/chat/completions`.
//! - **[`OllamaGenerator`]**: `POST /api/generate` with streaming off.
//!
//! Like the embedding providers, each call is a single request; empty model
//! output is a [`RecapError::GenerationFailure`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::RecapError;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Pull the text out of a response, treating blank output as a failure.
fn non_empty(text: Option<String>, service: &str) -> Result<String> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(RecapError::GenerationFailure(format!("{} returned no text", service)).into()),
    }
}

pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled. Set [llm] provider in config.")
    }
}

// ============ Gemini ============

/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiGenerator {
    http: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self {
            http: http_client(config)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key,
        })
    }
}

/// Concatenate the text parts of the first Gemini candidate.
fn gemini_text(json: &serde_json::Value) -> Option<String> {
    let parts = json.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Some(text)
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.url.trim_end_matches('/'),
                self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RecapError::from_response("gemini", response).await.into());
        }

        let json: serde_json::Value = response.json().await?;
        non_empty(gemini_text(&json), "gemini")
    }
}

// ============ OpenAI ============

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIGenerator {
    http: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
}

impl OpenAIGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            http: http_client(config)?,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RecapError::from_response("openai", response).await.into());
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string);
        non_empty(text, "openai")
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    http: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        Ok(Self {
            http: http_client(config)?,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        if !response.status().is_success() {
            return Err(RecapError::from_response("ollama", response).await.into());
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string);
        non_empty(text, "ollama")
    }
}

/// Create the [`TextGenerator`] named by `llm.provider`.
pub fn create_generator(config: &LlmConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown LLM provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_text_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Feat: add " }, { "text": "parser" }] }
            }]
        });
        assert_eq!(gemini_text(&json).unwrap(), "Feat: add parser");
    }

    #[test]
    fn test_gemini_text_missing_candidates() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(gemini_text(&json).is_none());
    }

    #[test]
    fn test_blank_output_is_generation_failure() {
        let err = non_empty(Some("   \n".to_string()), "gemini").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecapError>(),
            Some(RecapError::GenerationFailure(_))
        ));
        assert_eq!(non_empty(Some(" ok \n".to_string()), "gemini").unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_disabled_generator_errors() {
        assert!(DisabledGenerator.generate("hi").await.is_err());
        let generator = create_generator(&LlmConfig::default()).unwrap();
        assert_eq!(generator.model_name(), "disabled");
    }
}
