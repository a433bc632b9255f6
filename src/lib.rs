//! post-editor-fs: a blog `Posts` table exposed as a FUSE filesystem
//!
//! Languages appear as top-level directories and each post as a `{slug}.md`
//! file inside its language. Reading a post yields a JSON document with its
//! editable fields; writing the same document back saves them.
//!
//! # Architecture
//!
//! - **Store**: an opaque SQL executor (`SqlExecutor`) with MySQL and SQLite
//!   backends.
//! - **Connector**: `PostsConnector` maps virtual paths onto statements
//!   scoped by language and slug.
//! - **FUSE**: `PostsFs` translates kernel requests into connector calls and
//!   buffers writes per open handle.
//! - **Mount Manager**: handles lifecycle of multiple simultaneous mounts.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use post_editor_fs::config::Config;
//! use post_editor_fs::connector;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(Path::new("config.yaml"))?;
//! for mount in &config.mounts {
//!     let posts = connector::create(&mount.connector, mount.read_only).await?;
//!     for entry in posts.list(Path::new("/")).await? {
//!         println!("{}", entry.name);
//!     }
//!     posts.close().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod env;
pub mod error;
pub mod fuse;
pub mod mount;
pub mod path;
pub mod store;

pub use error::{PostFsError, Result};
