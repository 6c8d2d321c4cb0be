//! Physical placement of cache files, staged writes and atomic commits.
//!
//! The [`HandleFactory`] exclusively owns the directory tree below the cache
//! root. Writers obtain a [`TemporaryHandle`], fill it, and hand it back to
//! [`HandleFactory::commit`]:
//!
//! - **Replace mode** stages bytes in a sibling file named
//!   `<target><suffix><n>` and renames it onto the target on commit, so the
//!   visible entry switches from the old to the new version in one step.
//! - **Append mode** writes straight into the committed file. No rename is
//!   needed; visibility is protected by the writer holding the cache gate
//!   for the whole append.
//!
//! Deletions that fail are recorded in a [`FailedDeletionSet`] persisted at
//! the cache root. Recorded locations are logically absent: the next
//! existence check retries the deletion and reports "not there" no matter
//! how the retry went.
//!
//! # Locking
//!
//! Methods that mutate the tree take `&mut self` and are only reachable
//! through the writer side of the cache gate. The failed-deletion set sits
//! behind its own mutex because [`HandleFactory::check_file_exists`] retries
//! deletions while callers hold only the reader side.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::config::CacheConfig;
use crate::deletion::FailedDeletionSet;
use crate::error::{CacheError, CacheResult};
use crate::path::CachePath;
use crate::stats::CacheStats;
use crate::timestamp::{NO_TIMESTAMP, modified_millis, set_modified_millis};

/// How a [`TemporaryHandle`] writes to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Extend the committed file in place.
    Append,
    /// Stage into a sibling file and rename it over the target.
    Replace,
}

/// What an append handle restores when it is abandoned.
#[derive(Debug, Clone, Copy)]
struct AppendOrigin {
    len: u64,
    modified: FileTime,
    /// The handle created the file, so abandoning it removes the file.
    created: bool,
}

/// An uncommitted write bound to one cache entry.
///
/// Owned by the writer that created it. Dropping a handle without
/// committing it abandons the write: a replace-mode staging file is
/// removed, and an append-mode file is truncated back to the length it had
/// when the handle was opened, so the previously committed content stays
/// intact either way.
#[derive(Debug)]
pub struct TemporaryHandle {
    entry: CachePath,
    target: PathBuf,
    staging: PathBuf,
    mode: WriteMode,
    file: Option<File>,
    /// State of the target when an append handle was opened.
    append_origin: Option<AppendOrigin>,
    written: u64,
    sync_on_close: bool,
    /// Set once ownership of the on-disk state has passed to the factory.
    settled: bool,
    stats: Arc<CacheStats>,
}

impl TemporaryHandle {
    #[inline]
    pub fn entry(&self) -> &CachePath {
        &self.entry
    }

    #[inline]
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Where bytes are being written. Equal to the target in append mode.
    #[inline]
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    #[inline]
    pub fn target_path(&self) -> &Path {
        &self.target
    }

    /// Bytes written through this handle so far.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush and close the staging file.
    fn finish(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
            if self.sync_on_close {
                file.sync_all()?;
            }
        }
        self.file = None;
        Ok(())
    }

    fn discard(&mut self) {
        self.stats.record_abandoned_write();
        match self.mode {
            WriteMode::Replace => {
                self.file = None;
                if let Err(e) = fs::remove_file(&self.staging) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(staging = %self.staging.display(), error = %e, "Failed to remove abandoned staging file");
                    }
                }
            }
            WriteMode::Append => {
                let Some(origin) = self.append_origin else {
                    return;
                };
                let file = self.file.take();
                let rolled_back = if origin.created {
                    drop(file);
                    fs::remove_file(&self.target)
                } else {
                    // Truncation bumps the mtime even when the length does not
                    // change, so the original time is put back as well.
                    file.map_or(Ok(()), |file| file.set_len(origin.len)).and_then(|()| {
                        filetime::set_file_mtime(&self.target, origin.modified)
                    })
                };
                if let Err(e) = rolled_back {
                    warn!(target = %self.target.display(), error = %e, "Failed to roll back abandoned append");
                }
            }
        }
        debug!(entry = %self.entry, mode = ?self.mode, "Abandoned uncommitted write");
    }
}

impl Write for TemporaryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file is already closed"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for TemporaryHandle {
    fn drop(&mut self) {
        if !self.settled {
            self.discard();
        }
    }
}

/// Owner of the physical cache layout.
#[derive(Debug)]
pub struct HandleFactory {
    root: PathBuf,
    record: PathBuf,
    record_name: String,
    staging_suffix: String,
    sync_on_close: bool,
    next_staging: u64,
    pending: Mutex<FailedDeletionSet>,
    stats: Arc<CacheStats>,
}

impl HandleFactory {
    /// Open the factory over `config.root`, creating the root if needed and
    /// loading the failed-deletion record.
    ///
    /// A record that cannot be read is logged and replaced by an empty set;
    /// it never prevents the cache from opening.
    pub fn open(config: &CacheConfig, stats: Arc<CacheStats>) -> CacheResult<Self> {
        config.validate()?;
        let root = std::path::absolute(&config.root)
            .map_err(|e| CacheError::create_file(e, &CachePath::root(), &config.root))?;
        fs::create_dir_all(&root)
            .map_err(|e| CacheError::create_file(e, &CachePath::root(), &root))?;

        let record = root.join(&config.deletion_record);
        let mut pending = FailedDeletionSet::load(&record).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable deletion record");
            FailedDeletionSet::new()
        });
        let foreign = pending.retain(|location| location.starts_with(&root));
        for location in &foreign {
            warn!(path = %location.display(), "Dropping recorded deletion outside the cache root");
        }
        if !foreign.is_empty()
            && let Err(e) = pending.save(&record)
        {
            warn!(error = %e, "Failed to persist deletion record");
        }
        if !pending.is_empty() {
            debug!(count = pending.len(), "Loaded pending deletions");
        }

        Ok(Self {
            root,
            record,
            record_name: config.deletion_record.clone(),
            staging_suffix: config.staging_suffix.clone(),
            sync_on_close: config.sync_on_close,
            next_staging: 0,
            pending: Mutex::new(pending),
            stats,
        })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Physical location of a cache entry.
    ///
    /// Rejects the root itself and names reserved for staging files and the
    /// deletion record.
    pub fn resolve(&self, entry: &CachePath) -> CacheResult<PathBuf> {
        if entry.is_root() {
            return Err(CacheError::InvalidPath {
                path: entry.to_string(),
                reason: "the cache root is not an entry".to_string(),
            });
        }
        if let Some(segment) = entry
            .segments()
            .iter()
            .find(|segment| is_staging_name(segment, &self.staging_suffix))
        {
            return Err(CacheError::InvalidPath {
                path: entry.to_string(),
                reason: format!("segment '{segment}' has the form of a staging file name"),
            });
        }
        if entry.depth() == 1 && entry.segments()[0].starts_with(&self.record_name) {
            return Err(CacheError::InvalidPath {
                path: entry.to_string(),
                reason: "name is reserved for the deletion record".to_string(),
            });
        }
        Ok(entry.to_physical(&self.root))
    }

    /// Open a handle for writing `entry`.
    ///
    /// Parent directories are created as needed. In replace mode a fresh
    /// staging file is allocated next to the target; in append mode the
    /// target itself is opened (and created if missing).
    pub fn create_temporary_handle(
        &mut self,
        entry: &CachePath,
        mode: WriteMode,
    ) -> CacheResult<TemporaryHandle> {
        let target = self.resolve(entry)?;
        if target.is_dir() {
            return Err(CacheError::create_file(
                io::Error::new(io::ErrorKind::IsADirectory, "entry is a container"),
                entry,
                &target,
            ));
        }
        // Appending to a file that is logically deleted would revive its
        // stale bytes. A successful retry may compact the parent, so it runs
        // before the parents are created.
        if mode == WriteMode::Append && self.is_pending(&target) {
            self.do_delete(entry)?;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::create_file(e, entry, parent))?;
        }

        let (staging, file, append_origin) = match mode {
            WriteMode::Append => {
                let existed = target.is_file();
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&target)
                    .map_err(|e| CacheError::create_file(e, entry, &target))?;
                let metadata = file
                    .metadata()
                    .map_err(|e| CacheError::create_file(e, entry, &target))?;
                let origin = AppendOrigin {
                    len: metadata.len(),
                    modified: FileTime::from_last_modification_time(&metadata),
                    created: !existed,
                };
                (target.clone(), file, Some(origin))
            }
            WriteMode::Replace => {
                let (staging, file) = self.allocate_staging(entry, &target)?;
                (staging, file, None)
            }
        };

        trace!(entry = %entry, staging = %staging.display(), ?mode, "Opened temporary handle");
        Ok(TemporaryHandle {
            entry: entry.clone(),
            target,
            staging,
            mode,
            file: Some(file),
            append_origin,
            written: 0,
            sync_on_close: self.sync_on_close,
            settled: false,
            stats: Arc::clone(&self.stats),
        })
    }

    fn allocate_staging(&mut self, entry: &CachePath, target: &Path) -> CacheResult<(PathBuf, File)> {
        loop {
            let n = self.next_staging;
            self.next_staging = self.next_staging.wrapping_add(1);

            let mut name = target.as_os_str().to_owned();
            name.push(&self.staging_suffix);
            name.push(n.to_string());
            let staging = PathBuf::from(name);

            // create_new re-checks for collisions with files left by an
            // earlier process.
            match OpenOptions::new().write(true).create_new(true).open(&staging) {
                Ok(file) => return Ok((staging, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(CacheError::create_file(e, entry, &staging)),
            }
        }
    }

    /// Make the content of `handle` the visible entry with `timestamp` as its
    /// modification time.
    ///
    /// In replace mode an existing target is deleted first. If that deletion
    /// fails the staging file is removed and the error returned. If the
    /// rename fails the staging file stays in place until the next sweep.
    pub fn commit(&mut self, mut handle: TemporaryHandle, timestamp: i64) -> CacheResult<()> {
        handle
            .finish()
            .map_err(|e| CacheError::io(e, &handle.entry, &handle.staging))?;

        match handle.mode {
            WriteMode::Append => {
                handle.settled = true;
            }
            WriteMode::Replace => {
                if fs::symlink_metadata(&handle.target).is_ok() {
                    // On failure the handle drops unsettled and takes its
                    // staging file with it.
                    self.do_delete(&handle.entry)?;
                }
                if let Err(e) = fs::rename(&handle.staging, &handle.target) {
                    handle.settled = true;
                    warn!(entry = %handle.entry, staging = %handle.staging.display(), error = %e, "Rename failed, leaving staging file");
                    return Err(CacheError::rename(e, &handle.entry, &handle.target));
                }
                handle.settled = true;
                self.forget_pending(&handle.target);
            }
        }

        set_modified_millis(&handle.target, timestamp)
            .map_err(|e| CacheError::io(e, &handle.entry, &handle.target))?;

        self.stats.record_commit(handle.written);
        debug!(entry = %handle.entry, bytes = handle.written, timestamp, mode = ?handle.mode, "Committed cache entry");
        Ok(())
    }

    /// Delete the file behind `entry`, raising on failure.
    ///
    /// A failure is recorded in the deletion record before it is returned.
    pub fn do_delete(&mut self, entry: &CachePath) -> CacheResult<()> {
        let physical = self.resolve(entry)?;
        self.attempt_delete(&physical)
            .map_err(|e| CacheError::delete(e, entry, &physical))
    }

    /// Best-effort variant of [`do_delete`](Self::do_delete). Returns whether
    /// the file is gone.
    pub fn try_delete(&mut self, entry: &CachePath) -> bool {
        match self.resolve(entry) {
            Ok(physical) => self.attempt_delete(&physical).is_ok(),
            Err(_) => false,
        }
    }

    /// Whether a committed file exists for `entry`.
    ///
    /// This is not a pure predicate: if `entry` is recorded as a failed
    /// deletion, the deletion is retried and `false` is returned whatever the
    /// outcome.
    pub fn check_file_exists(&self, entry: &CachePath) -> bool {
        match self.resolve(entry) {
            Ok(physical) => self.physical_exists(&physical),
            Err(_) => false,
        }
    }

    fn physical_exists(&self, physical: &Path) -> bool {
        if self.is_pending(physical) {
            debug!(path = %physical.display(), "Retrying pending deletion");
            let _ = self.attempt_delete(physical);
            return false;
        }
        physical.is_file()
    }

    fn is_pending(&self, physical: &Path) -> bool {
        self.pending.lock().contains(physical)
    }

    fn attempt_delete(&self, physical: &Path) -> io::Result<()> {
        if !physical.starts_with(&self.root) {
            self.forget_pending(physical);
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "location is outside the cache root",
            ));
        }
        let result = match fs::remove_file(physical) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        };

        let mut pending = self.pending.lock();
        match result {
            Ok(()) => {
                if pending.remove(physical) {
                    self.persist(&pending);
                    self.stats.record_healed_deletion();
                    debug!(path = %physical.display(), "Pending deletion completed");
                }
                drop(pending);
                self.stats.record_deletion();
                self.compact(physical);
                Ok(())
            }
            Err(e) => {
                warn!(path = %physical.display(), error = %e, "Deletion failed, recording for retry");
                if pending.insert(physical.to_path_buf()) {
                    self.persist(&pending);
                }
                self.stats.record_failed_deletion();
                Err(e)
            }
        }
    }

    fn forget_pending(&self, physical: &Path) {
        let mut pending = self.pending.lock();
        if pending.remove(physical) {
            self.persist(&pending);
        }
    }

    fn persist(&self, pending: &FailedDeletionSet) {
        if let Err(e) = pending.save(&self.record) {
            warn!(error = %e, "Failed to persist deletion record");
        }
    }

    /// Remove the parent of a deleted file if it is now empty. Only one level
    /// is compacted per deletion, and never the root.
    fn compact(&self, physical: &Path) {
        let Some(parent) = physical.parent() else {
            return;
        };
        if parent == self.root || !parent.starts_with(&self.root) {
            return;
        }
        // remove_dir refuses non-empty directories.
        if fs::remove_dir(parent).is_ok() {
            debug!(dir = %parent.display(), "Compacted empty directory");
        }
    }

    /// Snapshot of the locations currently recorded as failed deletions.
    pub fn pending_deletions(&self) -> Vec<PathBuf> {
        self.pending.lock().iter().map(Path::to_path_buf).collect()
    }

    /// Retry every recorded deletion. Returns how many were cleared.
    pub fn retry_pending_deletions(&mut self) -> usize {
        self.pending_deletions()
            .iter()
            .filter(|physical| self.attempt_delete(physical).is_ok())
            .count()
    }

    /// Remove staging files left behind by failed renames or crashed
    /// writers. Returns how many were removed.
    ///
    /// Must not run while handles are open.
    pub fn sweep_stale_staging(&mut self) -> usize {
        let mut removed = 0;
        for entry in WalkDir::new(&self.root).min_depth(1).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !is_staging_name(name, &self.staging_suffix) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "Removed stale staging file");
                    removed += 1;
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove stale staging file"),
            }
        }
        removed
    }

    /// Open the committed file for `entry`, or `None` if there is none.
    pub fn open_read(&self, entry: &CachePath) -> CacheResult<Option<File>> {
        let physical = self.resolve(entry)?;
        if !self.physical_exists(&physical) {
            self.stats.record_miss();
            return Ok(None);
        }
        match File::open(&physical) {
            Ok(file) => {
                self.stats.record_hit();
                Ok(Some(file))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.stats.record_miss();
                Ok(None)
            }
            Err(e) => Err(CacheError::io(e, entry, &physical)),
        }
    }

    /// Modification time of `entry` in milliseconds, or [`NO_TIMESTAMP`].
    pub fn timestamp(&self, entry: &CachePath) -> i64 {
        let Ok(physical) = self.resolve(entry) else {
            return NO_TIMESTAMP;
        };
        if !self.physical_exists(&physical) {
            return NO_TIMESTAMP;
        }
        fs::metadata(&physical).map_or(NO_TIMESTAMP, |metadata| modified_millis(&metadata))
    }

    /// Change the modification time of an existing entry. Missing entries
    /// are left alone.
    pub fn set_timestamp(&mut self, entry: &CachePath, timestamp: i64) -> CacheResult<()> {
        let physical = self.resolve(entry)?;
        if !self.physical_exists(&physical) {
            trace!(entry = %entry, "Ignoring timestamp update for missing entry");
            return Ok(());
        }
        set_modified_millis(&physical, timestamp)
            .map_err(|e| CacheError::io(e, entry, &physical))
    }

    /// Size in bytes of the committed file for `entry`.
    pub fn content_length(&self, entry: &CachePath) -> Option<u64> {
        let physical = self.resolve(entry).ok()?;
        if !self.physical_exists(&physical) {
            return None;
        }
        fs::metadata(&physical).ok().map(|metadata| metadata.len())
    }

    /// Whether `entry` is a container (a directory in the physical tree).
    /// The root is always a container.
    pub fn is_container(&self, entry: &CachePath) -> bool {
        if entry.is_root() {
            return true;
        }
        self.resolve(entry).is_ok_and(|physical| physical.is_dir())
    }

    /// Names of committed entries and containers directly below `entry`,
    /// sorted. Staging files, the deletion record and logically deleted
    /// files are skipped.
    pub fn list_children(&self, entry: &CachePath) -> CacheResult<Vec<String>> {
        let dir = if entry.is_root() {
            self.root.clone()
        } else {
            self.resolve(entry)?
        };
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(CacheError::io(e, entry, &dir)),
        };

        let mut names = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| CacheError::io(e, entry, &dir))?;
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            if is_staging_name(&name, &self.staging_suffix) {
                continue;
            }
            if entry.is_root() && name.starts_with(&self.record_name) {
                continue;
            }
            let path = item.path();
            if self.is_pending(&path) {
                continue;
            }
            names.push(name);
        }
        names.sort_unstable();
        Ok(names)
    }
}

/// Whether `name` is a staging file name: the reserved suffix followed by
/// a non-empty run of digits.
fn is_staging_name(name: &str, suffix: &str) -> bool {
    name.rfind(suffix).is_some_and(|idx| {
        let tail = &name[idx + suffix.len()..];
        !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit())
    })
}
