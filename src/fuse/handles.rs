//! Open file handles
//!
//! Posts are saved as whole documents, so writes cannot go straight to the
//! connector. Each open handle keeps a private buffer: reads come from the
//! snapshot taken at open, writes patch the buffer, and the buffer is saved
//! on flush/release when it changed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, error};

use crate::connector::Connector;

/// Largest buffer a handle may grow to (16 MiB)
pub const MAX_DOCUMENT_SIZE: u64 = 16 * 1024 * 1024;

/// State of one open file
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub ino: u64,
    pub path: PathBuf,
    pub data: Vec<u8>,
    pub dirty: bool,
}

/// Table of open file handles, keyed by FUSE file handle
pub struct HandleTable {
    handles: DashMap<u64, OpenFile>,
    next_fh: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            // 0 is left for stateless opens
            next_fh: AtomicU64::new(1),
        }
    }

    /// Register an open file and return its handle
    pub fn open(&self, ino: u64, path: PathBuf, data: Vec<u8>) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(
            fh,
            OpenFile {
                ino,
                path,
                data,
                dirty: false,
            },
        );
        fh
    }

    /// Copy up to `size` bytes starting at `offset`. `None` for unknown handles.
    pub fn read(&self, fh: u64, offset: u64, size: u32) -> Option<Vec<u8>> {
        let file = self.handles.get(&fh)?;
        Some(slice_at(&file.data, offset, size).to_vec())
    }

    /// Write into the buffer, zero-filling any gap.
    ///
    /// Fails with `EBADF` for unknown handles and `EFBIG` when the write
    /// would end past `MAX_DOCUMENT_SIZE`.
    pub fn write(&self, fh: u64, offset: u64, data: &[u8]) -> Result<usize, i32> {
        let end = checked_end(offset, data.len() as u64)?;
        let mut file = self.handles.get_mut(&fh).ok_or(libc::EBADF)?;
        let start = offset as usize;
        if file.data.len() < end {
            file.data.resize(end, 0);
        }
        file.data[start..end].copy_from_slice(data);
        file.dirty = true;
        Ok(data.len())
    }

    /// Resize every open buffer of an inode, returning how many changed
    pub fn truncate_inode(&self, ino: u64, size: u64) -> Result<usize, i32> {
        let size = checked_end(size, 0)?;
        let mut touched = 0;
        for mut entry in self.handles.iter_mut() {
            if entry.ino == ino {
                entry.data.resize(size, 0);
                entry.dirty = true;
                touched += 1;
            }
        }
        Ok(touched)
    }

    /// Snapshot a dirty buffer for saving and mark it clean
    pub fn take_dirty(&self, fh: u64) -> Option<(PathBuf, Vec<u8>)> {
        let mut file = self.handles.get_mut(&fh)?;
        if !file.dirty {
            return None;
        }
        file.dirty = false;
        Some((file.path.clone(), file.data.clone()))
    }

    /// Flag a buffer as unsaved again after a failed save
    pub fn mark_dirty(&self, fh: u64) {
        if let Some(mut file) = self.handles.get_mut(&fh) {
            file.dirty = true;
        }
    }

    pub fn release(&self, fh: u64) -> Option<OpenFile> {
        self.handles.remove(&fh).map(|(_, file)| file)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_end(offset: u64, len: u64) -> Result<usize, i32> {
    match offset.checked_add(len) {
        Some(end) if end <= MAX_DOCUMENT_SIZE => Ok(end as usize),
        _ => Err(libc::EFBIG),
    }
}

/// Save a handle's buffer through the connector if it changed since the
/// last save. A failed save leaves the buffer dirty and returns its errno.
pub async fn commit(handles: &HandleTable, connector: &dyn Connector, fh: u64) -> Result<(), i32> {
    let Some((path, data)) = handles.take_dirty(fh) else {
        return Ok(());
    };

    debug!("commit: {:?} ({} bytes)", path, data.len());
    match connector.write(&path, &data).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("save error for {:?}: {}", path, e);
            handles.mark_dirty(fh);
            Err(e.to_errno())
        }
    }
}

/// Bytes of `data` in `[offset, offset + size)`, clamped to the buffer
pub fn slice_at(data: &[u8], offset: u64, size: u32) -> &[u8] {
    let start = (offset as usize).min(data.len());
    let end = start.saturating_add(size as usize).min(data.len());
    &data[start..end]
}
