//! Inode management for the virtual post tree
//!
//! FUSE addresses entries by inode while the connector works with virtual
//! paths. Paths stored here are connector paths: post files are recorded
//! without their `.md` display suffix.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::path::strip_extension;

/// Root directory inode (always 1 in FUSE)
pub const ROOT_INODE: u64 = 1;

/// Bidirectional inode <-> connector path map
pub struct InodeTable {
    by_inode: DashMap<u64, PathBuf>,
    by_path: DashMap<PathBuf, u64>,
    next_inode: AtomicU64,
}

impl InodeTable {
    pub fn new() -> Self {
        let table = Self {
            by_inode: DashMap::new(),
            by_path: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };

        let root = PathBuf::from("/");
        table.by_inode.insert(ROOT_INODE, root.clone());
        table.by_path.insert(root, ROOT_INODE);

        table
    }

    /// Inode for a path, allocating one on first sight
    pub fn lookup_or_insert(&self, path: &Path) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }

        *self.by_path.entry(path.to_path_buf()).or_insert_with(|| {
            let ino = self.next_inode.fetch_add(1, Ordering::SeqCst);
            self.by_inode.insert(ino, path.to_path_buf());
            ino
        })
    }

    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        self.by_inode.get(&ino).map(|p| p.clone())
    }

    pub fn inode(&self, path: &Path) -> Option<u64> {
        self.by_path.get(path).map(|i| *i)
    }

    /// Drop the mapping for a deleted post
    pub fn forget(&self, path: &Path) {
        if let Some((_, ino)) = self.by_path.remove(path) {
            self.by_inode.remove(&ino);
        }
    }

    pub fn len(&self) -> usize {
        self.by_inode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_inode.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector path of `name` inside `parent`.
///
/// Inside a language directory only `{slug}.md` names exist; the suffix is
/// dropped so the result addresses the post itself. Names that are not
/// UTF-8 fail with `EINVAL`, names the listing never shows with `ENOENT`.
pub fn child_path(parent: &Path, name: &OsStr) -> Result<PathBuf, i32> {
    let name = name.to_str().ok_or(libc::EINVAL)?;
    // "/" has one component, "/en" has two
    if parent.components().count() < 2 {
        return Ok(parent.join(name));
    }

    match strip_extension(name) {
        Some(slug) if !slug.is_empty() => Ok(parent.join(slug)),
        _ => Err(libc::ENOENT),
    }
}
