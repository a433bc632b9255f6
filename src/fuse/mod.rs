pub mod handles;
pub mod inode;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::consts::FOPEN_DIRECT_IO;
use fuser::{
    FileAttr, FileType as FuseFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use tokio::runtime::Handle;
use tracing::{debug, error, trace};

use crate::connector::{Connector, FileType, Metadata};
use crate::error::PostFsError;

use self::handles::{slice_at, HandleTable};
use self::inode::{child_path, InodeTable, ROOT_INODE};

/// Unwrap an errno result or send it as the reply and return
macro_rules! reply_try {
    ($reply:expr, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(errno) => {
                $reply.error(errno);
                return;
            }
        }
    };
}

/// Default TTL for attribute caching (1 second)
const ATTR_TTL: Duration = Duration::from_secs(1);

/// Generation number (not used, always 0)
const GENERATION: u64 = 0;

/// Block size for reporting
const BLOCK_SIZE: u32 = 4096;

fn to_fuse_file_type(ft: FileType) -> FuseFileType {
    match ft {
        FileType::File => FuseFileType::RegularFile,
        FileType::Directory => FuseFileType::Directory,
    }
}

/// Build FUSE attributes. Unknown sizes are reported as 0; files are opened
/// with direct I/O so the kernel reads until EOF regardless.
fn metadata_to_attr(ino: u64, meta: &Metadata, read_only: bool, uid: u32, gid: u32) -> FileAttr {
    let size = meta.size.unwrap_or(0);

    FileAttr {
        ino,
        size,
        blocks: size.div_ceil(BLOCK_SIZE as u64),
        atime: meta.mtime,
        mtime: meta.mtime,
        ctime: meta.mtime,
        crtime: meta.mtime,
        kind: to_fuse_file_type(meta.file_type),
        perm: meta.mode(read_only) as u16,
        nlink: if meta.is_dir() { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// FUSE filesystem over a posts connector
pub struct PostsFs {
    connector: Arc<dyn Connector>,
    inodes: InodeTable,
    handles: HandleTable,
    /// Runtime the connector's pool was created on
    handle: Handle,
    read_only: bool,
    uid: u32,
    gid: u32,
}

impl PostsFs {
    pub fn new(connector: Arc<dyn Connector>, handle: Handle, read_only: bool) -> Self {
        // Report every entry as owned by the mounting user
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };

        Self {
            connector,
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            handle,
            read_only,
            uid,
            gid,
        }
    }

    fn inode_to_path(&self, ino: u64) -> Result<PathBuf, i32> {
        self.inodes.path(ino).ok_or(libc::ENOENT)
    }

    fn child(&self, parent: u64, name: &OsStr) -> Result<PathBuf, i32> {
        let parent_path = self.inode_to_path(parent)?;
        child_path(&parent_path, name)
    }

    fn check_write_capability(&self) -> Result<(), i32> {
        if self.read_only || !self.connector.capabilities().write {
            return Err(libc::EROFS);
        }
        Ok(())
    }

    fn attr(&self, ino: u64, meta: &Metadata) -> FileAttr {
        metadata_to_attr(ino, meta, self.read_only, self.uid, self.gid)
    }

    /// Block the FUSE thread on a connector call
    fn run_async<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.handle.block_on(future)
    }

    fn stat(&self, path: &Path) -> Result<Metadata, PostFsError> {
        let connector = self.connector.clone();
        let path = path.to_path_buf();
        self.run_async(async move { connector.stat(&path).await })
    }

    fn commit(&self, fh: u64) -> Result<(), i32> {
        self.run_async(handles::commit(&self.handles, self.connector.as_ref(), fh))
    }
}

impl Filesystem for PostsFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = reply_try!(reply, self.child(parent, name));

        trace!("lookup: {:?}", path);

        match self.stat(&path) {
            Ok(meta) => {
                let ino = self.inodes.lookup_or_insert(&path);
                reply.entry(&ATTR_TTL, &self.attr(ino, &meta), GENERATION);
            }
            Err(PostFsError::NotFound(_)) | Err(PostFsError::InvalidPath(_)) => {
                reply.error(libc::ENOENT);
            }
            Err(e) => {
                error!("lookup error for {:?}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = reply_try!(reply, self.inode_to_path(ino));

        trace!("getattr: {:?} (ino={})", path, ino);

        match self.stat(&path) {
            Ok(meta) => reply.attr(&ATTR_TTL, &self.attr(ino, &meta)),
            Err(e) => {
                debug!("getattr error for {:?}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        // Only truncation of open buffers means anything here; the next
        // flush saves the truncated document.
        if let Some(new_size) = size {
            reply_try!(reply, self.check_write_capability());
            let touched = reply_try!(reply, self.handles.truncate_inode(ino, new_size));
            trace!("setattr truncate: ino={} size={} handles={}", ino, new_size, touched);
        }

        self.getattr(req, ino, reply);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = reply_try!(reply, self.inode_to_path(ino));

        let writable = flags & libc::O_ACCMODE != libc::O_RDONLY;
        if writable {
            reply_try!(reply, self.check_write_capability());
        }

        trace!("open: {:?} flags={:#o}", path, flags);

        let data = if flags & libc::O_TRUNC != 0 {
            Vec::new()
        } else {
            let connector = self.connector.clone();
            let path_for_async = path.clone();
            match self.run_async(async move { connector.read(&path_for_async).await }) {
                Ok(bytes) => bytes.to_vec(),
                Err(e) => {
                    error!("open error for {:?}: {}", path, e);
                    reply.error(e.to_errno());
                    return;
                }
            }
        };

        let fh = self.handles.open(ino, path, data);
        reply.opened(fh, FOPEN_DIRECT_IO);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!("read: ino={} fh={} offset={} size={}", ino, fh, offset, size);

        if let Some(data) = self.handles.read(fh, offset as u64, size) {
            reply.data(&data);
            return;
        }

        // No open handle: read straight from the table
        let path = reply_try!(reply, self.inode_to_path(ino));

        let connector = self.connector.clone();
        let path_for_async = path.clone();
        match self.run_async(async move { connector.read(&path_for_async).await }) {
            Ok(bytes) => reply.data(slice_at(&bytes, offset as u64, size)),
            Err(e) => {
                error!("read error for {:?}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply_try!(reply, self.check_write_capability());

        trace!("write: ino={} fh={} offset={} size={}", ino, fh, offset, data.len());

        let offset = reply_try!(reply, u64::try_from(offset).map_err(|_| libc::EINVAL));
        match self.handles.write(fh, offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        match self.commit(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.commit(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = self.commit(fh);
        self.handles.release(fh);
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply_try!(reply, self.check_write_capability());

        let path = reply_try!(reply, self.child(parent, name));

        debug!("create: {:?}", path);

        let connector = self.connector.clone();
        let path_for_async = path.clone();
        match self.run_async(async move {
            connector.create_file(&path_for_async).await?;
            connector.stat(&path_for_async).await
        }) {
            Ok(meta) => {
                let ino = self.inodes.lookup_or_insert(&path);
                let attr = self.attr(ino, &meta);
                let fh = self.handles.open(ino, path, Vec::new());
                reply.created(&ATTR_TTL, &attr, GENERATION, fh, FOPEN_DIRECT_IO);
            }
            Err(e) => {
                error!("create error for {:?}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = reply_try!(reply, self.child(parent, name));

        let connector = self.connector.clone();
        let path_for_async = path.clone();
        match self.run_async(async move { connector.create_dir(&path_for_async).await }) {
            Ok(()) => match self.stat(&path) {
                Ok(meta) => {
                    let ino = self.inodes.lookup_or_insert(&path);
                    reply.entry(&ATTR_TTL, &self.attr(ino, &meta), GENERATION);
                }
                Err(e) => reply.error(e.to_errno()),
            },
            Err(e) => {
                debug!("mkdir rejected for {:?}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, name: &OsStr, reply: ReplyEmpty) {
        // Languages disappear with their last post
        debug!("rmdir rejected: {:?}", name);
        reply.error(libc::EPERM);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        reply_try!(reply, self.check_write_capability());

        let path = reply_try!(reply, self.child(parent, name));

        debug!("unlink: {:?}", path);

        let connector = self.connector.clone();
        let path_for_async = path.clone();
        match self.run_async(async move { connector.remove_file(&path_for_async).await }) {
            Ok(()) => {
                self.inodes.forget(&path);
                reply.ok();
            }
            Err(e) => {
                error!("unlink error for {:?}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (from, to) = match (self.child(parent, name), self.child(newparent, newname)) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => {
                reply.error(e);
                return;
            }
        };

        let connector = self.connector.clone();
        let (from_for_async, to_for_async) = (from.clone(), to.clone());
        match self.run_async(async move { connector.rename(&from_for_async, &to_for_async).await })
        {
            Ok(()) => reply.ok(),
            Err(e) => {
                debug!("rename rejected {:?} -> {:?}: {}", from, to, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = reply_try!(reply, self.inode_to_path(ino));

        trace!("readdir: {:?} offset={}", path, offset);

        let connector = self.connector.clone();
        let path_for_async = path.clone();
        let entries = match self.run_async(async move { connector.list(&path_for_async).await }) {
            Ok(entries) => entries,
            Err(e) => {
                error!("readdir error for {:?}: {}", path, e);
                reply.error(e.to_errno());
                return;
            }
        };

        let parent_ino = path
            .parent()
            .and_then(|p| self.inodes.inode(p))
            .unwrap_or(ROOT_INODE);

        let mut listing: Vec<(u64, FuseFileType, String)> = vec![
            (ino, FuseFileType::Directory, ".".to_string()),
            (parent_ino, FuseFileType::Directory, "..".to_string()),
        ];

        for entry in entries {
            let Ok(entry_path) = child_path(&path, OsStr::new(&entry.name)) else {
                continue;
            };
            let entry_ino = self.inodes.lookup_or_insert(&entry_path);
            listing.push((entry_ino, to_fuse_file_type(entry.file_type), entry.name));
        }

        for (idx, (entry_ino, kind, name)) in listing.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (idx + 1) as i64, kind, &name) {
                // Buffer full
                break;
            }
        }

        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = reply_try!(reply, self.inode_to_path(ino));

        if mask & libc::W_OK != 0 && self.check_write_capability().is_err() {
            reply.error(libc::EROFS);
            return;
        }

        let connector = self.connector.clone();
        match self.run_async(async move { connector.exists(&path).await }) {
            Ok(true) => reply.ok(),
            Ok(false) => reply.error(libc::ENOENT),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        // Return dummy filesystem stats
        reply.statfs(
            u64::MAX,   // blocks
            u64::MAX,   // bfree
            u64::MAX,   // bavail
            u64::MAX,   // files
            u64::MAX,   // ffree
            BLOCK_SIZE, // bsize
            255,        // namelen
            BLOCK_SIZE, // frsize
        );
    }
}
