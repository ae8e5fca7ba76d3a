use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/recap.sqlite"

[github]
api_url = "http://127.0.0.1:9"
max_commits = 50

[ingest]
commit_delay_ms = 0
"#,
        root.display()
    );

    let config_path = config_dir.join("recap.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_recap(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_recap"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run recap: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env();

    let (stdout, stderr, ok) = run_recap(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/recap.sqlite").exists());

    let (_, stderr, ok) = run_recap(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_project_add_and_list() {
    let (_tmp, config) = setup_test_env();
    run_recap(&config, &["init"]);

    let (stdout, stderr, ok) = run_recap(
        &config,
        &["project", "add", "widgets", "https://github.com/acme/widgets.git/"],
    );
    assert!(ok, "project add failed: {}", stderr);
    assert!(stdout.contains("Added project widgets"));

    let (stdout, _, ok) = run_recap(&config, &["projects"]);
    assert!(ok);
    assert!(stdout.contains("widgets"));
    assert!(stdout.contains("https://github.com/acme/widgets"));
}

#[test]
fn test_project_add_rejects_malformed_url() {
    let (_tmp, config) = setup_test_env();
    run_recap(&config, &["init"]);

    let (_, stderr, ok) = run_recap(&config, &["project", "add", "bad", "https://github.com/acme"]);
    assert!(!ok);
    assert!(stderr.contains("Invalid GitHub URL"));

    let (stdout, _, _) = run_recap(&config, &["projects"]);
    assert!(stdout.contains("No projects."));
}

#[test]
fn test_duplicate_project_name_fails() {
    let (_tmp, config) = setup_test_env();
    run_recap(&config, &["init"]);

    let (_, _, ok) = run_recap(&config, &["project", "add", "widgets", "acme/widgets"]);
    assert!(ok);
    let (_, stderr, ok) = run_recap(&config, &["project", "add", "widgets", "acme/gadgets"]);
    assert!(!ok);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_unknown_project_is_an_error() {
    let (_tmp, config) = setup_test_env();
    run_recap(&config, &["init"]);

    let (_, stderr, ok) = run_recap(&config, &["commits", "nope"]);
    assert!(!ok);
    assert!(stderr.contains("nope"));
}

#[test]
fn test_commits_and_blank_search_on_fresh_project() {
    let (_tmp, config) = setup_test_env();
    run_recap(&config, &["init"]);
    run_recap(&config, &["project", "add", "widgets", "acme/widgets"]);

    let (stdout, stderr, ok) = run_recap(&config, &["commits", "widgets"]);
    assert!(ok, "commits failed: {}", stderr);
    assert!(stdout.contains("No commits."));

    let (stdout, stderr, ok) = run_recap(&config, &["search", "widgets", "   "]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("recap.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"x.sqlite\"\n[github]\nper_page = 500\n",
    )
    .unwrap();

    let (_, stderr, ok) = run_recap(&config_path, &["init"]);
    assert!(!ok);
    assert!(stderr.contains("per_page"));
}

#[test]
fn test_poll_requires_a_text_model() {
    let (_tmp, config) = setup_test_env();
    run_recap(&config, &["init"]);
    run_recap(&config, &["project", "add", "widgets", "acme/widgets"]);

    let (_, stderr, ok) = run_recap(&config, &["poll", "widgets"]);
    assert!(!ok);
    assert!(stderr.contains("[llm] provider"));

    let (stdout, _, _) = run_recap(&config, &["commits", "widgets"]);
    assert!(stdout.contains("No commits."));
}
