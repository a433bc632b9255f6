//! Posts table connector
//!
//! Maps the two-level virtual tree onto the `Posts` table:
//!
//! - `/` lists the distinct `lang` values as directories
//! - `/{lang}` lists that language's posts as `{slug}.md` files
//! - `/{lang}/{slug}` is a single post
//!
//! Every statement that touches a post is scoped by both `lang` and `slug`.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use tracing::{debug, trace, warn};

use crate::connector::document::PostFields;
use crate::connector::{
    Capabilities, Connector, DirEntry, DirEntryStream, Metadata, PathCapabilities,
};
use crate::error::{PostFsError, Result};
use crate::path::{display_name, PostAddress};
use crate::config::DEFAULT_QUERY_TIMEOUT;
use crate::store::sqlite::SqliteExecutor;
use crate::store::{Row, SqlExecutor, SqlValue};

/// Name the connector is registered under
pub const CONNECTOR_NAME: &str = "post_editor";

const SELECT_LANGUAGES: &str = "SELECT DISTINCT lang FROM Posts";
const SELECT_LANGUAGE_EXISTS: &str = "SELECT 1 FROM Posts WHERE lang = ? LIMIT 1";
const SELECT_POSTS: &str = "SELECT slug, createdAt FROM Posts WHERE lang = ?";
const SELECT_POST_CREATED: &str = "SELECT createdAt FROM Posts WHERE lang = ? AND slug = ?";
const SELECT_POST_FIELDS: &str =
    "SELECT title, description, content FROM Posts WHERE lang = ? AND slug = ?";
const INSERT_POST: &str = "INSERT INTO Posts(lang, slug, createdAt, updatedAt) VALUES(?, ?, ?, ?)";
const UPDATE_POST: &str = "UPDATE Posts SET published = ?, title = ?, description = ?, content = ?, updatedAt = ? WHERE lang = ? AND slug = ?";
const DELETE_POST: &str = "DELETE FROM Posts WHERE lang = ? AND slug = ?";

/// Timestamp format written to `createdAt` / `updatedAt`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Connector exposing the posts table as a filesystem
#[derive(Clone)]
pub struct PostsConnector {
    executor: Arc<dyn SqlExecutor>,
    query_timeout: Duration,
    read_only: bool,
}

impl PostsConnector {
    pub fn new(executor: Arc<dyn SqlExecutor>, query_timeout: Duration) -> Self {
        Self {
            executor,
            query_timeout,
            read_only: false,
        }
    }

    /// Connector over a fresh in-memory SQLite table
    pub fn in_memory() -> Result<Self> {
        let executor = SqliteExecutor::open_in_memory()?;
        executor.create_schema()?;
        Ok(Self::new(Arc::new(executor), DEFAULT_QUERY_TIMEOUT))
    }

    /// Reject every mutating operation
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| PostFsError::Timeout(self.query_timeout))?
    }

    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        self.with_timeout(self.executor.query(sql, params)).await
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        self.with_timeout(self.executor.execute(sql, params)).await
    }

    fn check_writable(&self, op: &str, path: &Path) -> Result<()> {
        if self.read_only {
            return Err(PostFsError::NotAllowed(format!(
                "{} on read-only mount: {:?}",
                op, path
            )));
        }
        Ok(())
    }

    fn post_params(address: &PostAddress) -> Vec<SqlValue> {
        vec![
            address.language.as_str().into(),
            address.slug.as_str().into(),
        ]
    }

    async fn post_exists(&self, address: &PostAddress) -> Result<bool> {
        let rows = self
            .query(SELECT_POST_CREATED, Self::post_params(address))
            .await?;
        Ok(!rows.is_empty())
    }
}

/// Interpret a `createdAt` value as a calendar date.
///
/// DATE and DATETIME renderings both start with `YYYY-MM-DD`; anything else
/// yields the UNIX epoch rather than failing the listing.
pub fn parse_created_at(value: Option<&str>) -> SystemTime {
    let parsed = value.and_then(|v| {
        let date = v.get(..10)?;
        match v.as_bytes().get(10) {
            None | Some(b' ') | Some(b'T') => {}
            Some(_) => return None,
        }
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    });

    match parsed.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        Some(midnight) => {
            let secs = midnight.and_utc().timestamp();
            u64::try_from(secs)
                .map(|s| UNIX_EPOCH + Duration::from_secs(s))
                .unwrap_or(UNIX_EPOCH)
        }
        None => {
            warn!("Unparsable createdAt {:?}, using epoch", value);
            UNIX_EPOCH
        }
    }
}

fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[async_trait]
impl Connector for PostsConnector {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read: true,
            write: !self.read_only,
            rename: false,
            create_dir: false,
        }
    }

    fn metadata(&self, path: &Path) -> PathCapabilities {
        let address = PostAddress::parse_path(path).unwrap_or_default();
        PathCapabilities::for_address(&address)
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        let address = PostAddress::parse_path(path)?;
        trace!("stat: {}", address);

        if address.is_root() {
            return Ok(Metadata::directory(UNIX_EPOCH));
        }

        if !address.has_slug() {
            let rows = self
                .query(SELECT_LANGUAGE_EXISTS, vec![address.language.as_str().into()])
                .await?;
            return if rows.is_empty() {
                Err(PostFsError::NotFound(address.to_string()))
            } else {
                Ok(Metadata::directory(UNIX_EPOCH))
            };
        }

        let rows = self
            .query(SELECT_POST_CREATED, Self::post_params(&address))
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| PostFsError::NotFound(address.to_string()))?;
        Ok(Metadata::file(None, parse_created_at(row.text(0).as_deref())))
    }

    fn list_dir(&self, path: &Path) -> DirEntryStream {
        let this = self.clone();
        let path = path.to_path_buf();

        Box::pin(try_stream! {
            let address = PostAddress::parse_path(&path)?;
            trace!("list_dir: {}", address);

            if address.is_root() {
                for row in this.query(SELECT_LANGUAGES, vec![]).await? {
                    match row.text(0) {
                        Some(language) if !language.is_empty() => {
                            yield DirEntry::directory(language);
                        }
                        _ => continue,
                    }
                }
            } else if address.has_slug() {
                Err::<(), _>(PostFsError::NotADirectory(address.to_string()))?;
            } else {
                let rows = this
                    .query(SELECT_POSTS, vec![address.language.as_str().into()])
                    .await?;
                for row in rows {
                    let Some(slug) = row.text(0) else { continue };
                    let mtime = parse_created_at(row.text(1).as_deref());
                    yield DirEntry::file(display_name(&slug), None, Some(mtime));
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Bytes> {
        let address = PostAddress::parse_path(path)?.require_post(path)?;
        trace!("read: {}", address);

        let rows = self
            .query(SELECT_POST_FIELDS, Self::post_params(&address))
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| PostFsError::NotFound(address.to_string()))?;

        let fields = PostFields {
            title: row.text(0),
            description: row.text(1),
            content: row.text(2),
        };
        Ok(Bytes::from(fields.to_document()?))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let address = PostAddress::parse_path(path)?.require_post(path)?;
        self.check_writable("write", path)?;
        let fields = PostFields::from_document(data)?;
        debug!("write: {} ({} bytes)", address, data.len());

        if !self.post_exists(&address).await? {
            return Err(PostFsError::NotFound(address.to_string()));
        }

        let mut params: Vec<SqlValue> = vec![
            true.into(),
            fields.title.into(),
            fields.description.into(),
            fields.content.into(),
            now_timestamp().into(),
        ];
        params.extend(Self::post_params(&address));

        self.execute(UPDATE_POST, params).await?;
        Ok(())
    }

    async fn create_file(&self, path: &Path) -> Result<()> {
        let address = PostAddress::parse_path(path)?.require_post(path)?;
        self.check_writable("create_file", path)?;
        debug!("create_file: {}", address);

        if self.post_exists(&address).await? {
            return Err(PostFsError::AlreadyExists(address.to_string()));
        }

        let now = now_timestamp();
        let mut params = Self::post_params(&address);
        params.push(now.clone().into());
        params.push(now.into());

        self.execute(INSERT_POST, params).await?;
        Ok(())
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        Err(PostFsError::NotAllowed(format!(
            "directories are derived from posts: {:?}",
            path
        )))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        let address = PostAddress::parse_path(path)?.require_post(path)?;
        self.check_writable("remove_file", path)?;

        let removed = self.execute(DELETE_POST, Self::post_params(&address)).await?;
        debug!("remove_file: {} ({} rows)", address, removed);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Err(PostFsError::NotAllowed(format!(
            "posts cannot be moved: {:?} -> {:?}",
            from, to
        )))
    }

    async fn close(&self) -> Result<()> {
        debug!("close: releasing {} executor", self.executor.backend());
        self.executor.close().await
    }
}
