//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs on the `file_contents`
//! row itself (see [`crate::embedding::vec_to_blob`]). Vector search loads
//! a project's vectors and ranks them in process.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::RecapError;
use crate::models::{
    CommitRecord, FileContentRecord, FileMatch, NewCommit, NewFileContent, NewProject, Project,
};

use super::{commit_record, file_record, project_record, rank_by_similarity, Store};

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`]; the schema comes from [`crate::migrate::apply_schema`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Turn a UNIQUE violation into [`RecapError::PersistenceConflict`].
fn map_conflict(err: sqlx::Error, what: impl FnOnce() -> String) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RecapError::PersistenceConflict(what()).into()
        }
        _ => err.into(),
    }
}

fn project_from_row(row: &SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        github_url: row.get("github_url"),
        github_token: row.get("github_token"),
        created_at: row.get("created_at"),
    }
}

fn commit_from_row(row: &SqliteRow) -> CommitRecord {
    CommitRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        hash: row.get("hash"),
        message: row.get("message"),
        author_name: row.get("author_name"),
        author_avatar: row.get("author_avatar"),
        authored_at: row.get("authored_at"),
        summary: row.get("summary"),
        created_at: row.get("created_at"),
    }
}

fn file_from_row(row: &SqliteRow) -> FileContentRecord {
    let blob: Option<Vec<u8>> = row.get("embedding");
    FileContentRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        path: row.get("path"),
        content: row.get("content"),
        summary: row.get("summary"),
        embedding: blob.map(|b| blob_to_vec(&b)),
        created_at: row.get("created_at"),
    }
}

async fn insert_commit(conn: &mut SqliteConnection, record: &CommitRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO commits (id, project_id, hash, message, author_name, author_avatar,
                             authored_at, summary, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.project_id)
    .bind(&record.hash)
    .bind(&record.message)
    .bind(&record.author_name)
    .bind(&record.author_avatar)
    .bind(record.authored_at)
    .bind(&record.summary)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        map_conflict(e, || {
            format!(
                "commit {} already stored for project {}",
                record.hash, record.project_id
            )
        })
    })?;
    Ok(())
}

/// Insert the row, then attach the vector to it.
async fn insert_file(conn: &mut SqliteConnection, record: &FileContentRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO file_contents (id, project_id, path, content, summary, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.project_id)
    .bind(&record.path)
    .bind(&record.content)
    .bind(&record.summary)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;

    if let Some(vector) = &record.embedding {
        sqlx::query("UPDATE file_contents SET embedding = ? WHERE id = ?")
            .bind(vec_to_blob(vector))
            .bind(&record.id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_project(&self, project: &NewProject) -> Result<Project> {
        let record = project_record(project);
        sqlx::query(
            "INSERT INTO projects (id, name, github_url, github_token, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.github_url)
        .bind(&record.github_token)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_conflict(e, || format!("project {} already exists", record.name)))?;
        Ok(record)
    }

    async fn find_project(&self, id_or_name: &str) -> Result<Option<Project>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, github_url, github_token, created_at
            FROM projects
            WHERE id = ? OR name = ?
            ORDER BY id = ? DESC
            LIMIT 1
            "#,
        )
        .bind(id_or_name)
        .bind(id_or_name)
        .bind(id_or_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, name, github_url, github_token, created_at FROM projects ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(project_from_row).collect())
    }

    async fn find_commit_hashes(&self, project_id: &str) -> Result<HashSet<String>> {
        let hashes: Vec<String> = sqlx::query_scalar("SELECT hash FROM commits WHERE project_id = ?")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(hashes.into_iter().collect())
    }

    async fn find_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, hash, message, author_name, author_avatar,
                   authored_at, summary, created_at
            FROM commits
            WHERE project_id = ?
            ORDER BY authored_at DESC, created_at DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(commit_from_row).collect())
    }

    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitRecord> {
        let record = commit_record(commit);
        let mut conn = self.pool.acquire().await?;
        insert_commit(&mut conn, &record).await?;
        Ok(record)
    }

    async fn create_commits(&self, commits: &[NewCommit]) -> Result<Vec<CommitRecord>> {
        let records: Vec<CommitRecord> = commits.iter().map(commit_record).collect();
        let mut tx = self.pool.begin().await?;
        for record in &records {
            // Dropping `tx` on error rolls the batch back.
            insert_commit(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(records)
    }

    async fn create_file_content(&self, file: &NewFileContent) -> Result<FileContentRecord> {
        let record = file_record(file);
        let mut tx = self.pool.begin().await?;
        insert_file(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn upsert_file_content(&self, file: &NewFileContent) -> Result<FileContentRecord> {
        let record = file_record(file);
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM file_contents WHERE project_id = ? AND path = ?")
            .bind(&record.project_id)
            .bind(&record.path)
            .execute(&mut *tx)
            .await?;
        insert_file(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn find_file_contents(&self, project_id: &str) -> Result<Vec<FileContentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, path, content, summary, embedding, created_at
            FROM file_contents
            WHERE project_id = ?
            ORDER BY path, created_at
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(file_from_row).collect())
    }

    async fn vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<FileMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT path, summary, embedding
            FROM file_contents
            WHERE project_id = ? AND embedding IS NOT NULL
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let decoded: Vec<(String, String, Vec<f32>)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (row.get("path"), row.get("summary"), blob_to_vec(&blob))
            })
            .collect();

        Ok(rank_by_similarity(
            query,
            decoded
                .iter()
                .map(|(p, s, v)| (p.as_str(), s.as_str(), v.as_slice())),
            limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommitInfo;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteStore, Project) {
        let tmp = TempDir::new().unwrap();
        let mut config = crate::config::parse_config("[db]\npath = \"unused.sqlite\"\n").unwrap();
        config.db.path = tmp.path().join("data").join("recap.sqlite");
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::apply_schema(&pool).await.unwrap();
        let store = SqliteStore::new(pool);
        let project = store
            .create_project(&NewProject {
                name: "widgets".to_string(),
                github_url: "https://github.com/acme/widgets".to_string(),
                github_token: None,
            })
            .await
            .unwrap();
        (tmp, store, project)
    }

    fn commit(project_id: &str, hash: &str, at: i64) -> NewCommit {
        NewCommit {
            project_id: project_id.to_string(),
            info: CommitInfo {
                hash: hash.to_string(),
                message: "msg".to_string(),
                author_name: "Ada".to_string(),
                author_avatar: "https://avatars.example/ada".to_string(),
                authored_at: chrono::DateTime::from_timestamp(at, 0),
            },
            summary: "Fix: something".to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_roundtrip_and_conflict() {
        let (_tmp, store, project) = setup().await;
        store.create_commit(&commit(&project.id, "a1", 100)).await.unwrap();
        store.create_commit(&commit(&project.id, "b2", 200)).await.unwrap();

        let err = store
            .create_commit(&commit(&project.id, "a1", 100))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecapError>(),
            Some(RecapError::PersistenceConflict(_))
        ));

        let commits = store.find_commits(&project.id).await.unwrap();
        let hashes: Vec<&str> = commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["b2", "a1"]);
        assert_eq!(commits[0].summary.as_deref(), Some("Fix: something"));
        assert_eq!(commits[0].authored_at, Some(200));
    }

    #[tokio::test]
    async fn test_create_commits_rolls_back_on_conflict() {
        let (_tmp, store, project) = setup().await;
        store.create_commit(&commit(&project.id, "b2", 1)).await.unwrap();

        let batch = vec![commit(&project.id, "a1", 1), commit(&project.id, "b2", 2)];
        assert!(store.create_commits(&batch).await.is_err());
        let hashes = store.find_commit_hashes(&project.id).await.unwrap();
        assert_eq!(hashes.len(), 1);
        assert!(!hashes.contains("a1"));
    }

    #[tokio::test]
    async fn test_file_vectors_roundtrip_and_search() {
        let (_tmp, store, project) = setup().await;
        let file = |path: &str, embedding: Option<Vec<f32>>| NewFileContent {
            project_id: project.id.clone(),
            path: path.to_string(),
            content: "fn main() {}".to_string(),
            summary: format!("summary of {}", path),
            embedding,
        };

        store.create_file_content(&file("src/a.rs", Some(vec![1.0, 0.0]))).await.unwrap();
        store.create_file_content(&file("src/b.rs", Some(vec![0.0, 1.0]))).await.unwrap();
        store.create_file_content(&file("src/c.rs", None)).await.unwrap();

        let rows = store.find_file_contents(&project.id).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].embedding.as_deref(), Some(&[1.0f32, 0.0][..]));
        assert!(rows[2].embedding.is_none());

        let hits = store.vector_search(&project.id, &[0.1, 0.9], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "src/b.rs");

        store.upsert_file_content(&file("src/a.rs", None)).await.unwrap();
        let rows = store.find_file_contents(&project.id).await.unwrap();
        assert_eq!(rows.iter().filter(|r| r.path == "src/a.rs").count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_project_name_conflicts() {
        let (_tmp, store, project) = setup().await;
        let err = store
            .create_project(&NewProject {
                name: "widgets".to_string(),
                github_url: "https://github.com/acme/other".to_string(),
                github_token: None,
            })
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<RecapError>().is_some());
        assert_eq!(
            store.find_project("widgets").await.unwrap().unwrap().id,
            project.id
        );
        assert_eq!(store.list_projects().await.unwrap().len(), 1);
    }
}
