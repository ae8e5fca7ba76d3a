//! # Repo Recap CLI (`recap`)
//!
//! ## Usage
//!
//! ```bash
//! recap --config ./config/recap.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recap init` | Create the SQLite database and schema |
//! | `recap project add <name> <url>` | Register a GitHub repository |
//! | `recap projects` | List registered projects |
//! | `recap poll <project>` | Summarize commits not seen before |
//! | `recap index <project>` | Summarize and embed every file |
//! | `recap commits <project>` | Show stored commit summaries |
//! | `recap search <project> "<question>"` | Find the files closest to a question |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repo_recap::config::{self, Config};
use repo_recap::error::RecapError;
use repo_recap::github::RepoRef;
use repo_recap::ingest::{add_project, Ingestor};
use repo_recap::models::{NewProject, Project};
use repo_recap::store::{SqliteStore, Store};
use repo_recap::{db, migrate, search};

/// Repo Recap: AI summaries of a repository's commits and files.
#[derive(Parser)]
#[command(name = "recap", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recap.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage registered repositories.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// List registered projects.
    Projects,

    /// Ingest new commits for a project.
    ///
    /// Lists the most recent commits, skips those already stored, and
    /// summarizes each remaining diff one at a time.
    Poll {
        /// Project name or id.
        project: String,
    },

    /// Index every file on the project's default branch.
    Index {
        /// Project name or id.
        project: String,

        /// Access token for this run, overriding the project's stored token.
        #[arg(long)]
        token: Option<String>,
    },

    /// Show stored commit summaries, newest first.
    Commits {
        /// Project name or id.
        project: String,
    },

    /// Ask a question and list the most relevant files.
    Search {
        /// Project name or id.
        project: String,

        question: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Register a repository by URL (`https://github.com/owner/repo`).
    Add {
        name: String,
        url: String,

        /// Access token stored with the project and used for indexing.
        #[arg(long)]
        token: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_store(cfg: &Config) -> Result<Arc<dyn Store>> {
    let pool = db::connect(cfg).await?;
    migrate::apply_schema(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

async fn resolve_project(store: &dyn Store, id_or_name: &str) -> Result<Project> {
    store
        .find_project(id_or_name)
        .await?
        .ok_or_else(|| RecapError::NotFound(format!("project '{}'", id_or_name)).into())
}

/// Commands that call a model fail fast when it is not configured, rather
/// than storing a placeholder for every commit or file.
fn require_providers(cfg: &Config, llm: bool, embedding: bool) -> Result<()> {
    if llm && !cfg.llm.is_enabled() {
        bail!("This command requires a text model. Set [llm] provider in config.");
    }
    if embedding && !cfg.embedding.is_enabled() {
        bail!("This command requires embeddings. Set [embedding] provider in config.");
    }
    Ok(())
}

fn format_ts(ts: Option<i64>) -> String {
    ts.and_then(|t| chrono::DateTime::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Project {
            action: ProjectAction::Add { name, url, token },
        } => {
            let store = open_store(&cfg).await?;
            let project = add_project(
                store.as_ref(),
                NewProject {
                    name,
                    github_url: url,
                    github_token: token,
                },
            )
            .await?;
            println!("Added project {} ({})", project.name, project.id);
        }
        Commands::Projects => {
            let store = open_store(&cfg).await?;
            let projects = store.list_projects().await?;
            if projects.is_empty() {
                println!("No projects.");
            }
            for project in projects {
                let repo = RepoRef::parse(&project.github_url)
                    .map(|r| r.web_url())
                    .unwrap_or_else(|_| project.github_url.clone());
                println!("{}  {}  {}", project.id, project.name, repo);
            }
        }
        Commands::Poll { project } => {
            require_providers(&cfg, true, false)?;
            let store = open_store(&cfg).await?;
            let project = resolve_project(store.as_ref(), &project).await?;
            let ingestor = Ingestor::from_config(&cfg, store)?;
            let created = ingestor.poll_commits(&project).await?;
            for commit in &created {
                println!(
                    "{}  {}",
                    commit.hash.get(..7).unwrap_or(&commit.hash),
                    commit.summary.as_deref().unwrap_or("")
                );
            }
            println!("{} new commit(s) ingested.", created.len());
        }
        Commands::Index { project, token } => {
            require_providers(&cfg, true, true)?;
            let store = open_store(&cfg).await?;
            let project = resolve_project(store.as_ref(), &project).await?;
            let ingestor = Ingestor::from_config(&cfg, store)?;
            let report = ingestor.index_repository(&project, token.as_deref()).await?;
            println!(
                "Indexed {} of {} file(s).",
                report.indexed, report.files_seen
            );
            for failure in &report.failed {
                println!("  failed: {} ({})", failure.path, failure.reason);
            }
        }
        Commands::Commits { project } => {
            let store = open_store(&cfg).await?;
            let project = resolve_project(store.as_ref(), &project).await?;
            let commits = store.find_commits(&project.id).await?;
            if commits.is_empty() {
                println!("No commits.");
            }
            for commit in commits {
                println!(
                    "{}  {}  {}",
                    commit.hash.get(..7).unwrap_or(&commit.hash),
                    format_ts(commit.authored_at),
                    commit.author_name
                );
                println!("    {}", commit.summary.as_deref().unwrap_or("(no summary)"));
            }
        }
        Commands::Search {
            project,
            question,
            limit,
        } => {
            if !question.trim().is_empty() {
                require_providers(&cfg, false, true)?;
            }
            let store = open_store(&cfg).await?;
            let project = resolve_project(store.as_ref(), &project).await?;
            let ingestor = Ingestor::from_config(&cfg, store)?;
            let hits = search::search_files(
                ingestor.summarizer(),
                ingestor.store(),
                &project,
                &question,
                limit,
            )
            .await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.2}] {}", i + 1, hit.score, hit.path);
                println!("    {}", hit.summary);
            }
        }
    }

    Ok(())
}
