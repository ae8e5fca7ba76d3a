//! # Repo Recap
//!
//! Commit and file summaries for GitHub repositories, searchable by
//! question.
//!
//! Repo Recap registers a repository as a *project*, then runs two batch
//! pipelines against it: commit ingestion summarizes every commit diff it
//! has not seen before, and content indexing summarizes and embeds every
//! file on the default branch. Both go through a rate-limit-aware retry
//! wrapper and persist through a storage gateway.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │ GitHub API   │──▶│  Pipelines     │──▶│  Store    │
//! │ (github)     │   │ commits/files  │   │ SQLite    │
//! └──────────────┘   └──────┬────────┘   └─────┬─────┘
//!                           │                  │
//!                    ┌──────▼───────┐    ┌─────▼─────┐
//!                    │ Summarizer   │    │  search   │
//!                    │ llm+embedding│    └───────────┘
//!                    └──────────────┘
//! ```
//!
//! Every remote call (GitHub, text model, embedding model) is wrapped by
//! [`retry::retry`].
//!
//! ## Quick Start
//!
//! ```bash
//! recap init
//! recap project add widgets https://github.com/acme/widgets
//! recap poll widgets
//! recap index widgets
//! recap search widgets "where is the retry logic?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Failure taxonomy shared by all remote calls |
//! | [`retry`] | Backoff and rate-limit cooldown wrapper |
//! | [`github`] | Commit, diff, and file tree fetching |
//! | [`llm`] | Generative text providers |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`summarize`] | Diff and file summaries, embeddings |
//! | [`store`] | Persistence gateway (SQLite, in-memory) |
//! | [`ingest`] | Pipeline wiring and project registration |
//! | [`ingest_commits`] | Commit ingestion pipeline |
//! | [`ingest_files`] | Content indexing pipeline |
//! | [`search`] | Question search over indexed files |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod github;
pub mod ingest;
pub mod ingest_commits;
pub mod ingest_files;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod retry;
pub mod search;
pub mod store;
pub mod summarize;
