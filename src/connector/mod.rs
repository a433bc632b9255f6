pub mod document;
pub mod policy;
pub mod posts;

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tracing::info;

use crate::config::ConnectorConfig;
use crate::error::{PostFsError, Result};
use crate::store::mysql::MysqlExecutor;
use crate::store::sqlite::SqliteExecutor;
use crate::store::SqlExecutor;

pub use policy::PathCapabilities;
pub use posts::PostsConnector;

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

/// Default file mode (rw-r--r--)
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Default directory mode (rwxr-xr-x)
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Metadata for a file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub file_type: FileType,
    /// `None` when the size is not known without reading the file
    pub size: Option<u64>,
    pub mtime: SystemTime,
}

impl Metadata {
    pub fn file(size: Option<u64>, mtime: SystemTime) -> Self {
        Self {
            file_type: FileType::File,
            size,
            mtime,
        }
    }

    pub fn directory(mtime: SystemTime) -> Self {
        Self {
            file_type: FileType::Directory,
            size: None,
            mtime,
        }
    }

    /// Permission bits, dropping write bits on read-only mounts
    pub fn mode(&self, read_only: bool) -> u32 {
        let mode = if self.is_dir() {
            DEFAULT_DIR_MODE
        } else {
            DEFAULT_FILE_MODE
        };
        if read_only {
            mode & !0o222
        } else {
            mode
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }
}

/// Directory entry returned by list_dir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
    /// `None` is the "unknown size" sentinel
    pub size: Option<u64>,
    pub mtime: Option<SystemTime>,
}

impl DirEntry {
    pub fn file(name: impl Into<String>, size: Option<u64>, mtime: Option<SystemTime>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::File,
            size,
            mtime,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::Directory,
            size: None,
            mtime: None,
        }
    }

    /// Modification time as UNIX seconds, 0 when unknown
    pub fn modified_unix(&self) -> u64 {
        self.mtime
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }
}

/// Connector-wide capabilities, checked by the FUSE layer before dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Can read files
    pub read: bool,
    /// Can create, save and delete files (false = read-only)
    pub write: bool,
    /// Native rename support
    pub rename: bool,
    /// Directories can be created
    pub create_dir: bool,
}

/// Stream type for directory listings
pub type DirEntryStream = Pin<Box<dyn Stream<Item = Result<DirEntry>> + Send>>;

/// Core connector trait for storage backends
///
/// Connectors are path-based. Each operation receives a virtual path and
/// performs the requested action; the FUSE layer handles inode mapping,
/// open file buffering and capability checking.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get connector capabilities
    fn capabilities(&self) -> Capabilities;

    /// Per-path capabilities offered to callers. Never fails.
    fn metadata(&self, path: &Path) -> PathCapabilities;

    /// Get metadata for a path
    async fn stat(&self, path: &Path) -> Result<Metadata>;

    /// Check if a path exists
    ///
    /// Default implementation uses stat()
    async fn exists(&self, path: &Path) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(PostFsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List directory contents as a stream
    fn list_dir(&self, path: &Path) -> DirEntryStream;

    /// List directory contents, failing on the first error
    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.list_dir(path).try_collect().await
    }

    /// Read the whole document stored at a path
    async fn read(&self, path: &Path) -> Result<Bytes>;

    /// Replace the document stored at a path
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Create an empty file
    async fn create_file(&self, path: &Path) -> Result<()>;

    /// Create a directory
    async fn create_dir(&self, path: &Path) -> Result<()>;

    /// Remove a file
    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Rename/move a file or directory
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Release backend resources. Later calls fail.
    async fn close(&self) -> Result<()>;
}

/// Build the posts connector for a mount.
///
/// This is the factory the daemon registers for every configured mount;
/// the connector `type` selects the SQL backend.
pub async fn create(config: &ConnectorConfig, read_only: bool) -> Result<Arc<dyn Connector>> {
    let executor: Arc<dyn SqlExecutor> = match config {
        ConnectorConfig::Mysql(mysql) => Arc::new(MysqlExecutor::connect(mysql).await?),
        ConnectorConfig::Sqlite(sqlite) => {
            let executor = SqliteExecutor::open(&sqlite.path)?;
            if sqlite.create_schema {
                executor.create_schema()?;
            }
            Arc::new(executor)
        }
    };

    info!(
        "Created {} connector ({} backend, read_only={})",
        posts::CONNECTOR_NAME,
        config.name(),
        read_only
    );

    Ok(Arc::new(
        PostsConnector::new(executor, config.query_timeout()).with_read_only(read_only),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_modified_unix() {
        let entry = DirEntry::file("a.md", None, Some(UNIX_EPOCH + Duration::from_secs(86400)));
        assert_eq!(entry.modified_unix(), 86400);
        assert_eq!(DirEntry::directory("en").modified_unix(), 0);
        assert!(DirEntry::directory("en").is_dir());
    }

    #[test]
    fn test_mode_read_only() {
        let file = Metadata::file(None, UNIX_EPOCH);
        assert_eq!(file.mode(false), 0o644);
        assert_eq!(file.mode(true), 0o444);
        let dir = Metadata::directory(UNIX_EPOCH);
        assert_eq!(dir.mode(true), 0o555);
    }

    #[tokio::test]
    async fn test_create_sqlite_connector() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConnectorConfig::Sqlite(crate::config::SqliteConnectorConfig {
            path: dir.path().join("posts.db"),
            create_schema: true,
            query_timeout: None,
        });

        let connector = create(&config, false).await.unwrap();
        assert!(connector.capabilities().write);
        connector.create_file(Path::new("/en/first")).await.unwrap();
        let entries = connector.list(Path::new("/")).await.unwrap();
        assert_eq!(entries, vec![DirEntry::directory("en")]);
        connector.close().await.unwrap();
    }
}
