//! Shared fixtures for posts connector tests
//!
//! Each test builds its own in-memory table so tests can run in parallel.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use post_editor_fs::connector::{Connector, PostsConnector};
use post_editor_fs::store::sqlite::SqliteExecutor;
use post_editor_fs::store::{SqlExecutor, SqlValue};
use post_editor_fs::Result;

/// A connector plus raw access to the table behind it
pub struct Fixture {
    pub connector: PostsConnector,
    pub executor: Arc<SqliteExecutor>,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let executor = Arc::new(SqliteExecutor::open_in_memory()?);
        executor.create_schema()?;
        let connector = PostsConnector::new(executor.clone(), Duration::from_secs(5));
        Ok(Self {
            connector,
            executor,
        })
    }

    /// Insert a row directly, bypassing the connector
    pub async fn insert_raw(&self, lang: &str, slug: &str, created_at: Option<&str>) -> Result<()> {
        self.executor
            .execute(
                "INSERT INTO Posts(lang, slug, createdAt) VALUES(?, ?, ?)",
                vec![lang.into(), slug.into(), created_at.map(str::to_string).into()],
            )
            .await?;
        Ok(())
    }

    /// Stored column values for one post
    pub async fn row(&self, lang: &str, slug: &str) -> Result<Option<Vec<SqlValue>>> {
        let rows = self
            .executor
            .query(
                "SELECT published, title, description, content FROM Posts WHERE lang = ? AND slug = ?",
                vec![lang.into(), slug.into()],
            )
            .await?;
        Ok(rows.into_iter().next().map(|r| r.0))
    }

    pub async fn names(&self, path: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .connector
            .list(Path::new(path))
            .await?
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        Ok(names)
    }
}

/// A saved document with the given values
pub fn document(title: &str, description: &str, content: &str) -> Vec<u8> {
    serde_json::json!({
        "title": { "value": title },
        "description": { "value": description },
        "content": { "value": content },
    })
    .to_string()
    .into_bytes()
}
