//! GitHub source host: commit listing, commit diffs, and file trees.
//!
//! [`SourceHost`] is the seam the pipelines depend on; [`GithubClient`]
//! implements it against the GitHub REST API.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list commits | `GET /repos/{owner}/{repo}/commits?per_page=N&page=P` |
//! | commit diff | `GET /repos/{owner}/{repo}/commits/{sha}` with `Accept: application/vnd.github.v3.diff` |
//! | default branch | `GET /repos/{owner}/{repo}` |
//! | file tree | `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1` |
//! | file content | `GET /repos/{owner}/{repo}/git/blobs/{sha}` (base64) |
//!
//! Throttling (HTTP 429, or 403 with `x-ratelimit-remaining: 0`) surfaces
//! as [`RecapError::RateLimited`] with the reset hint attached, for the
//! retry wrapper to act on.
//! Credential and permission failures (401, other 403s) are
//! [`RecapError::AccessDenied`] and are not retried.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::config::GithubConfig;
use crate::error::{rate_limit_hint, RecapError};
use crate::models::{CommitInfo, RepoFile};
use crate::retry::{retry, RetryError, RetryPolicy};

/// Normalized `(owner, name)` identifier of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse a user-supplied repository URL.
    ///
    /// Accepts `https://host/owner/repo`, `host/owner/repo`,
    /// `git@host:owner/repo`, and bare `owner/repo`. Trailing slashes and a
    /// `.git` suffix are stripped first. Anything that does not yield
    /// exactly one non-empty owner and one non-empty name is rejected with
    /// [`RecapError::InvalidInput`].
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || RecapError::InvalidInput(format!("Invalid GitHub URL: {}", url));

        let mut cleaned = url.trim().trim_end_matches('/');
        if let Some(stripped) = cleaned.strip_suffix(".git") {
            cleaned = stripped.trim_end_matches('/');
        }

        let (has_host, rest) = if let Some(rest) = cleaned
            .strip_prefix("https://")
            .or_else(|| cleaned.strip_prefix("http://"))
        {
            (true, rest.to_string())
        } else if let Some(rest) = cleaned.strip_prefix("git@") {
            (true, rest.replacen(':', "/", 1))
        } else {
            (false, cleaned.to_string())
        };

        let segments: Vec<&str> = rest.split('/').collect();
        let (owner, name) = match segments.as_slice() {
            [_host, owner, name] => (*owner, *name),
            [owner, name] if !has_host => (*owner, *name),
            _ => return Err(invalid().into()),
        };

        let valid = |s: &str| !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c == ':');
        if !valid(owner) || !valid(name) {
            return Err(invalid().into());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Browser URL of the repository on github.com.
    pub fn web_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Remote operations the pipelines need from a source-hosting service.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Newest-first commit metadata, truncated to the configured maximum.
    ///
    /// Fails with [`RecapError::NotFound`] when the repository has no commits.
    /// `token` overrides the client's own credentials when given.
    async fn list_commits(&self, repo: &RepoRef, token: Option<&str>) -> Result<Vec<CommitInfo>>;

    /// Raw unified diff for one commit.
    async fn commit_diff(&self, repo: &RepoRef, hash: &str, token: Option<&str>) -> Result<String>;

    /// Every readable, non-ignored file on the default branch.
    ///
    /// Unreadable entries are skipped with a warning.
    async fn list_file_tree(&self, repo: &RepoRef, token: Option<&str>) -> Result<Vec<RepoFile>>;
}

// ============ GitHub API payloads ============

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    author: Option<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: Option<ApiGitAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiGitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct ApiTree {
    tree: Vec<ApiTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct ApiTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiBlob {
    content: String,
    encoding: String,
}

// ============ Client ============

const SERVICE: &str = "github";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// GitHub REST client implementing [`SourceHost`].
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
    max_commits: usize,
    per_page: usize,
    fetch_concurrency: usize,
    ignore: GlobSet,
    retry: RetryPolicy,
}

impl GithubClient {
    /// Build a client from `[github]` config. `retry` governs blob fetches.
    pub fn new(config: &GithubConfig, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repo-recap/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.resolved_token(),
            max_commits: config.max_commits,
            per_page: config.per_page.min(config.max_commits).max(1),
            fetch_concurrency: config.fetch_concurrency.max(1),
            ignore: build_ignore_set(&config.ignore_files)?,
            retry,
        })
    }

    /// True when `path` matches one of the ignore patterns.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore.is_match(path)
    }

    fn repo_url(&self, repo: &RepoRef, suffix: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_url, repo.owner, repo.name, suffix)
    }

    async fn get(&self, url: &str, accept: &str, token: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = token.or(self.token.as_deref()) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", url))?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(github_error(response).await.into())
    }

    async fn fetch_blob(&self, repo: &RepoRef, sha: &str, token: Option<&str>) -> Result<ApiBlob> {
        let url = self.repo_url(repo, &format!("/git/blobs/{}", sha));
        let blob: ApiBlob = self.get(&url, JSON_MEDIA_TYPE, token).await?.json().await?;
        Ok(blob)
    }

    async fn default_branch(&self, repo: &RepoRef, token: Option<&str>) -> Result<String> {
        let meta: ApiRepository = self
            .get(&self.repo_url(repo, ""), JSON_MEDIA_TYPE, token)
            .await?
            .json()
            .await
            .with_context(|| format!("Invalid repository metadata for {}", repo))?;
        Ok(meta.default_branch)
    }
}

#[async_trait]
impl SourceHost for GithubClient {
    async fn list_commits(&self, repo: &RepoRef, token: Option<&str>) -> Result<Vec<CommitInfo>> {
        let mut commits = Vec::new();
        let mut page = 1usize;

        while commits.len() < self.max_commits {
            let url = self.repo_url(
                repo,
                &format!("/commits?per_page={}&page={}", self.per_page, page),
            );
            let batch: Vec<ApiCommit> = match self.get(&url, JSON_MEDIA_TYPE, token).await {
                Ok(response) => response
                    .json()
                    .await
                    .with_context(|| format!("Invalid commit list for {}", repo))?,
                // GitHub answers 409 for a repository without any commits.
                Err(e) if is_status(&e, 409) => Vec::new(),
                Err(e) => return Err(e),
            };

            let short_page = batch.len() < self.per_page;
            commits.extend(batch.into_iter().map(CommitInfo::from));
            if short_page {
                break;
            }
            page += 1;
        }

        if commits.is_empty() {
            return Err(RecapError::NotFound(format!("No commits found for repository: {}", repo)).into());
        }

        sort_newest_first(&mut commits);
        commits.truncate(self.max_commits);
        Ok(commits)
    }

    async fn commit_diff(&self, repo: &RepoRef, hash: &str, token: Option<&str>) -> Result<String> {
        let url = self.repo_url(repo, &format!("/commits/{}", hash));
        let diff = self
            .get(&url, DIFF_MEDIA_TYPE, token)
            .await?
            .text()
            .await
            .with_context(|| format!("Failed to read diff for commit {}", hash))?;
        Ok(diff)
    }

    async fn list_file_tree(&self, repo: &RepoRef, token: Option<&str>) -> Result<Vec<RepoFile>> {
        let branch = self.default_branch(repo, token).await?;
        let url = self.repo_url(repo, &format!("/git/trees/{}?recursive=1", branch));
        let tree: ApiTree = self
            .get(&url, JSON_MEDIA_TYPE, token)
            .await?
            .json()
            .await
            .with_context(|| format!("Invalid tree listing for {}", repo))?;

        if tree.truncated {
            tracing::warn!(repo = %repo, branch = %branch, "tree listing truncated by GitHub; some files will be missing");
        }

        let entries: Vec<ApiTreeEntry> = tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob" && !self.is_ignored(&e.path))
            .collect();

        tracing::info!(repo = %repo, branch = %branch, files = entries.len(), "loading file tree");

        let mut files: Vec<RepoFile> = stream::iter(entries)
            .map(|entry| async move {
                let label = format!("fetch blob {}", entry.path);
                // Only the download is retried; undecodable content fails once.
                let content = retry(&self.retry, &label, || self.fetch_blob(repo, &entry.sha, token))
                    .await
                    .map_err(RetryError::into_last_error)
                    .and_then(|blob| decode_blob(&blob));
                match content {
                    Ok(content) => Some(RepoFile {
                        path: entry.path,
                        content,
                    }),
                    Err(e) => {
                        tracing::warn!(repo = %repo, path = %entry.path, error = %e, "skipping unreadable file");
                        None
                    }
                }
            })
            .buffer_unordered(self.fetch_concurrency)
            .filter_map(|file| async move { file })
            .collect()
            .await;

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

impl From<ApiCommit> for CommitInfo {
    fn from(c: ApiCommit) -> Self {
        let (author_name, authored_at) = match c.commit.author {
            Some(a) => (a.name.unwrap_or_default(), a.date),
            None => (String::new(), None),
        };
        Self {
            hash: c.sha,
            message: c.commit.message,
            author_name,
            author_avatar: c.author.and_then(|u| u.avatar_url).unwrap_or_default(),
            authored_at,
        }
    }
}

/// Order commits by author timestamp, newest first. Undated commits sink.
pub fn sort_newest_first(commits: &mut [CommitInfo]) {
    commits.sort_by(|a, b| b.authored_at.cmp(&a.authored_at));
}

/// Map a failed GitHub response. Quota exhaustion comes back as 403 with
/// `x-ratelimit-remaining: 0`, and secondary limits as 403 with
/// `retry-after`; both are treated like a 429. Any other 403 is a
/// permission failure.
async fn github_error(response: reqwest::Response) -> RecapError {
    let headers = response.headers();
    let throttled = response.status().as_u16() == 403
        && (headers.contains_key("retry-after")
            || headers
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim() == "0")
                .unwrap_or(false));

    if throttled {
        return RecapError::RateLimited {
            service: SERVICE.to_string(),
            retry_after: rate_limit_hint(response.headers(), Utc::now().timestamp()),
        };
    }
    RecapError::from_response(SERVICE, response).await
}

fn is_status(err: &anyhow::Error, status: u16) -> bool {
    matches!(
        err.downcast_ref::<RecapError>(),
        Some(RecapError::RemoteUnavailable { status: s, .. }) if *s == status
    )
}

fn decode_blob(blob: &ApiBlob) -> Result<String> {
    if blob.encoding != "base64" {
        anyhow::bail!("Unsupported blob encoding: {}", blob.encoding);
    }
    let compact: String = blob.content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .context("Invalid base64 blob content")?;
    String::from_utf8(bytes).context("File is not valid UTF-8")
}

/// Build the ignore matcher. Bare file names match at any depth.
pub fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = if pattern.contains('/') {
            pattern.clone()
        } else {
            format!("**/{}", pattern)
        };
        builder.add(Glob::new(&pattern)?);
    }
    Ok(builder.build()?)
}
