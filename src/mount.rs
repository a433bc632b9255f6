//! Mount management and lifecycle

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fuser::MountOption;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::connector::posts::CONNECTOR_NAME;
use crate::connector::Connector;
use crate::error::{PostFsError, Result};
use crate::fuse::PostsFs;

/// A mounted post tree
pub struct ActiveMount {
    pub path: PathBuf,
    connector: Arc<dyn Connector>,
    session: Option<fuser::BackgroundSession>,
}

impl ActiveMount {
    /// Unmount the filesystem. The connector stays open until `close` is called.
    pub fn unmount(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Unmounting {:?}", self.path);
            drop(session);
        }
    }
}

impl Drop for ActiveMount {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Mount options for a post tree
pub fn mount_options(read_only: bool) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(CONNECTOR_NAME.to_string()),
        MountOption::AutoUnmount,
        MountOption::AllowOther,
        MountOption::DefaultPermissions,
    ];
    if read_only {
        options.push(MountOption::RO);
    }
    options
}

/// Tracks every mount of the daemon
pub struct MountManager {
    mounts: Mutex<Vec<ActiveMount>>,
    /// Runtime the connectors were created on
    handle: Handle,
}

impl MountManager {
    pub fn new(handle: Handle) -> Self {
        Self {
            mounts: Mutex::new(Vec::new()),
            handle,
        }
    }

    /// Mount a connector at `path`.
    ///
    /// `read_only` adds the kernel RO option on top of the connector's own
    /// write rejection.
    pub fn mount(&self, path: PathBuf, connector: Arc<dyn Connector>, read_only: bool) -> Result<()> {
        info!("Mounting at {:?}", path);

        if !path.exists() {
            return Err(PostFsError::NotFound(format!(
                "Mount point does not exist: {:?}",
                path
            )));
        }

        if !path.is_dir() {
            return Err(PostFsError::NotADirectory(format!(
                "Mount point is not a directory: {:?}",
                path
            )));
        }

        let fs = PostsFs::new(connector.clone(), self.handle.clone(), read_only);
        let options = mount_options(read_only);
        if read_only {
            info!("Mounting {:?} as read-only", path);
        }

        let session = fuser::spawn_mount2(fs, &path, &options)?;

        self.mounts.lock().push(ActiveMount {
            path: path.clone(),
            connector,
            session: Some(session),
        });

        info!("Successfully mounted at {:?}", path);
        Ok(())
    }

    pub fn unmount(&self, path: &Path) -> Result<()> {
        let mut mounts = self.mounts.lock();
        match mounts.iter().position(|m| m.path == path) {
            Some(pos) => {
                mounts.remove(pos).unmount();
                Ok(())
            }
            None => Err(PostFsError::NotFound(format!("No mount at {:?}", path))),
        }
    }

    pub fn unmount_all(&self) {
        info!("Unmounting all filesystems");
        for mount in self.mounts.lock().iter_mut() {
            mount.unmount();
        }
    }

    /// Unmount everything and release every connector's pool
    pub async fn close_all(&self) {
        let mounts: Vec<ActiveMount> = self.mounts.lock().drain(..).collect();
        for mut mount in mounts {
            mount.unmount();
            if let Err(e) = mount.connector.close().await {
                warn!("Failed to close connector for {:?}: {}", mount.path, e);
            }
        }
    }

    pub fn list_mounts(&self) -> Vec<PathBuf> {
        self.mounts.lock().iter().map(|m| m.path.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.mounts.lock().len()
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        self.unmount_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_options() {
        let rw = mount_options(false);
        assert!(rw.contains(&MountOption::FSName(CONNECTOR_NAME.to_string())));
        assert!(!rw.contains(&MountOption::RO));

        let ro = mount_options(true);
        assert!(ro.contains(&MountOption::RO));
    }

    #[tokio::test]
    async fn test_mount_missing_path() {
        let manager = MountManager::new(Handle::current());
        let connector = crate::connector::PostsConnector::in_memory().unwrap();
        let err = manager
            .mount(
                PathBuf::from("/nonexistent/post-editor-fs"),
                Arc::new(connector),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, PostFsError::NotFound(_)));
        assert_eq!(manager.count(), 0);
    }
}
