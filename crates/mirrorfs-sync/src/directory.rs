//! Remote store backed by a local directory tree.
//!
//! Useful as a mirror target for the CLI and as a realistic remote in tests:
//! entries are plain files, containers are directories, and the file
//! modification time is the remote timestamp.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use mirrorfs_core::timestamp::{modified_millis, set_modified_millis};
use mirrorfs_core::{CachePath, NO_TIMESTAMP};
use tracing::{debug, instrument};

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;

/// Prefix of the temporary files used for atomic pushes.
const PUSH_PREFIX: &str = ".mirrorfs-push";

/// A [`RemoteStore`] over a directory.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    /// Use `root` as the remote tree. The directory is created if missing.
    pub fn new(root: impl Into<PathBuf>) -> SyncResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| SyncError::io(&CachePath::root(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, path: &CachePath) -> PathBuf {
        path.to_physical(&self.root)
    }
}

impl RemoteStore for DirectoryRemote {
    fn exists(&self, path: &CachePath) -> SyncResult<bool> {
        match fs::symlink_metadata(self.locate(path)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    fn is_container(&self, path: &CachePath) -> SyncResult<bool> {
        Ok(self.locate(path).is_dir())
    }

    fn children(&self, path: &CachePath) -> SyncResult<Vec<String>> {
        let dir = self.locate(path);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(SyncError::io(path, e)),
        };

        let mut names = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| SyncError::io(path, e))?;
            match item.file_name().into_string() {
                Ok(name) if !name.starts_with(PUSH_PREFIX) => names.push(name),
                Ok(_) => {}
                Err(raw) => debug!(name = ?raw, "Skipping non UTF-8 remote name"),
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    fn remote_timestamp(&self, path: &CachePath) -> SyncResult<i64> {
        match fs::metadata(self.locate(path)) {
            Ok(metadata) => Ok(modified_millis(&metadata)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(NO_TIMESTAMP),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    fn fetch(&self, path: &CachePath) -> SyncResult<Box<dyn Read + Send>> {
        let file = File::open(self.locate(path)).map_err(|e| SyncError::io(path, e))?;
        Ok(Box::new(file))
    }

    #[instrument(level = "debug", skip_all, fields(path = %path))]
    fn push(&self, path: &CachePath, content: &mut dyn Read) -> SyncResult<()> {
        if path.is_root() {
            return Err(SyncError::remote(path, "cannot push to the remote root"));
        }
        let target = self.locate(path);
        let parent = target
            .parent()
            .ok_or_else(|| SyncError::remote(path, "remote location has no parent"))?;
        fs::create_dir_all(parent).map_err(|e| SyncError::io(path, e))?;

        // Temp file in the same directory so the final rename stays on one
        // file system.
        let mut temp_file = tempfile::Builder::new()
            .prefix(PUSH_PREFIX)
            .tempfile_in(parent)
            .map_err(|e| SyncError::io(path, e))?;
        let written = io::copy(content, &mut temp_file).map_err(|e| SyncError::io(path, e))?;
        temp_file
            .persist(&target)
            .map_err(|e| SyncError::io(path, e.error))?;

        debug!(bytes = written, "Wrote remote file");
        Ok(())
    }

    fn set_remote_timestamp(&self, path: &CachePath, timestamp: i64) -> SyncResult<()> {
        set_modified_millis(&self.locate(path), timestamp).map_err(|e| SyncError::io(path, e))
    }
}
