use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_ignore_files")]
    pub ignore_files: Vec<String>,
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            max_commits: default_max_commits(),
            per_page: default_per_page(),
            fetch_concurrency: default_fetch_concurrency(),
            ignore_files: default_ignore_files(),
            timeout_secs: default_github_timeout(),
        }
    }
}

impl GithubConfig {
    /// Configured token, falling back to `GITHUB_TOKEN` from the environment.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_max_commits() -> usize {
    100
}
fn default_per_page() -> usize {
    100
}
fn default_fetch_concurrency() -> usize {
    5
}
fn default_ignore_files() -> Vec<String> {
    vec![
        "package-lock.json".to_string(),
        "yarn.lock".to_string(),
        "pnpm-lock.yaml".to_string(),
        "bun.lockb".to_string(),
    ]
}
fn default_github_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,
    /// Ceiling on total rate-limit waiting per operation; `0` disables it.
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            rate_limit_cooldown_secs: default_cooldown_secs(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_max_rate_limit_wait_secs() -> u64 {
    3600
}

/// How a re-run of content indexing treats files indexed by earlier runs.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReindexPolicy {
    /// Every run inserts fresh rows; earlier rows for the same path remain.
    #[default]
    Append,
    /// Rows for the same repository and path are replaced.
    Upsert,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_commit_delay_ms")]
    pub commit_delay_ms: u64,
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
    #[serde(default)]
    pub reindex: ReindexPolicy,
    #[serde(default)]
    pub persist_failed_files: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            commit_delay_ms: default_commit_delay_ms(),
            summary_chars: default_summary_chars(),
            reindex: ReindexPolicy::default(),
            persist_failed_files: false,
        }
    }
}

fn default_commit_delay_ms() -> u64 {
    100
}
fn default_summary_chars() -> usize {
    1000
}

const PROVIDERS: &[&str] = &["disabled", "gemini", "openai", "ollama"];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate github
    if config.github.max_commits == 0 {
        bail!("github.max_commits must be > 0");
    }
    if !(1..=100).contains(&config.github.per_page) {
        bail!("github.per_page must be in [1, 100]");
    }
    if config.github.fetch_concurrency == 0 {
        bail!("github.fetch_concurrency must be > 0");
    }

    // Validate retry
    if config.retry.max_retries == 0 {
        bail!("retry.max_retries must be >= 1");
    }

    // Validate ingest
    if config.ingest.summary_chars == 0 {
        bail!("ingest.summary_chars must be > 0");
    }

    // Validate providers
    for (section, provider) in [
        ("llm", config.llm.provider.as_str()),
        ("embedding", config.embedding.provider.as_str()),
    ] {
        if !PROVIDERS.contains(&provider) {
            bail!(
                "Unknown {} provider: '{}'. Must be one of: {}",
                section,
                provider,
                PROVIDERS.join(", ")
            );
        }
    }

    if config.embedding.is_enabled()
        && (config.embedding.dims.is_none() || config.embedding.dims == Some(0))
    {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/recap.sqlite\"\n").unwrap();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.max_commits, 100);
        assert_eq!(config.github.fetch_concurrency, 5);
        assert_eq!(config.github.ignore_files.len(), 4);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.rate_limit_cooldown_secs, 60);
        assert_eq!(config.ingest.commit_delay_ms, 100);
        assert_eq!(config.ingest.summary_chars, 1000);
        assert_eq!(config.ingest.reindex, ReindexPolicy::Append);
        assert!(!config.llm.is_enabled());
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_reindex_policy_parses() {
        let config = parse_config(
            "[db]\npath = \"x.sqlite\"\n[ingest]\nreindex = \"upsert\"\npersist_failed_files = true\n",
        )
        .unwrap();
        assert_eq!(config.ingest.reindex, ReindexPolicy::Upsert);
        assert!(config.ingest.persist_failed_files);
    }

    #[test]
    fn test_enabled_embedding_requires_dims() {
        let err = parse_config(
            "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"gemini\"\nmodel = \"text-embedding-004\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse_config("[db]\npath = \"x.sqlite\"\n[llm]\nprovider = \"bard\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_per_page_bounds() {
        assert!(parse_config("[db]\npath = \"x.sqlite\"\n[github]\nper_page = 101\n").is_err());
        assert!(parse_config("[db]\npath = \"x.sqlite\"\n[github]\nper_page = 0\n").is_err());
    }
}
