use std::io;
use thiserror::Error;

/// Main error type for post-editor-fs operations
#[derive(Error, Debug)]
pub enum PostFsError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Operation not allowed: {0}")]
    NotAllowed(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Post already exists: {0}")]
    AlreadyExists(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PostFsError {
    /// Convert error to libc errno for FUSE responses
    pub fn to_errno(&self) -> i32 {
        match self {
            PostFsError::InvalidPath(_) => libc::EINVAL,
            PostFsError::NotAllowed(_) => libc::EPERM,
            PostFsError::NotFound(_) => libc::ENOENT,
            PostFsError::NotADirectory(_) => libc::ENOTDIR,
            PostFsError::AlreadyExists(_) => libc::EEXIST,
            PostFsError::Query(_) => libc::EIO,
            PostFsError::Decode(_) => libc::EINVAL,
            PostFsError::Connection(_) => libc::EIO,
            PostFsError::Timeout(_) => libc::ETIMEDOUT,
            PostFsError::Config(_) => libc::EINVAL,
            PostFsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<serde_json::Error> for PostFsError {
    fn from(e: serde_json::Error) -> Self {
        PostFsError::Decode(e.to_string())
    }
}

/// Result type alias for post-editor-fs operations
pub type Result<T> = std::result::Result<T, PostFsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(
            PostFsError::InvalidPath("/a/b/c".into()).to_errno(),
            libc::EINVAL
        );
        assert_eq!(PostFsError::NotAllowed("mkdir".into()).to_errno(), libc::EPERM);
        assert_eq!(PostFsError::Query("boom".into()).to_errno(), libc::EIO);
        assert_eq!(
            PostFsError::Io(io::Error::from_raw_os_error(libc::ENOSPC)).to_errno(),
            libc::ENOSPC
        );
    }

    #[test]
    fn test_json_error_is_decode() {
        let err: PostFsError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, PostFsError::Decode(_)));
    }
}
