//! Path-addressed content operations behind a single cache-wide gate.
//!
//! [`CacheService`] is a locking façade over the [`HandleFactory`]. One
//! reader/writer lock covers the whole cache:
//!
//! - **Writer side**: add, remove, set-timestamp, wrap-output-stream,
//!   commit and delete.
//! - **Reader side**: get, has, timestamp, length and listing.
//!
//! The gate is coarse. A write to `/a` blocks a concurrent read
//! of an unrelated `/b`; callers must not assume per-path isolation. In
//! return, commits are totally ordered against every other mutation and a
//! reader never sees a half-written entry.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, trace};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::factory::{HandleFactory, WriteMode};
use crate::path::CachePath;
use crate::stats::CacheStats;
use crate::stream::{CachingOutputStream, UpdateCallback};
use crate::timestamp::now_millis;

/// Content cache over a directory tree.
///
/// Cheap to share: wrap it in an `Arc` and hand clones to every thread.
///
/// # Example
///
/// ```
/// use mirrorfs_core::{CacheConfig, CachePath, CacheService};
/// use std::io::Read;
///
/// let dir = tempfile::tempdir().unwrap();
/// let cache = CacheService::open(CacheConfig::new(dir.path())).unwrap();
/// let path: CachePath = "/notes/today.txt".parse().unwrap();
///
/// cache.add_content_with_timestamp(&path, &b"hello"[..], 1_700_000_000_000, false).unwrap();
///
/// let mut content = String::new();
/// cache.get_content(&path).unwrap().unwrap().read_to_string(&mut content).unwrap();
/// assert_eq!(content, "hello");
/// assert_eq!(cache.get_content_timestamp(&path), 1_700_000_000_000);
/// ```
#[derive(Debug)]
pub struct CacheService {
    gate: Arc<RwLock<HandleFactory>>,
    stats: Arc<CacheStats>,
}

impl CacheService {
    /// Open a cache with `config`.
    ///
    /// Leftover staging files are swept (unless disabled) and deletions
    /// recorded by an earlier process are retried before the cache is
    /// returned.
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        let stats = Arc::new(CacheStats::new());
        let mut factory = HandleFactory::open(&config, Arc::clone(&stats))?;

        let swept = if config.sweep_on_open {
            factory.sweep_stale_staging()
        } else {
            0
        };
        let healed = factory.retry_pending_deletions();
        info!(
            root = %factory.root().display(),
            swept,
            healed,
            pending = factory.pending_deletions().len(),
            "Opened content cache"
        );

        Ok(Self::from_factory(factory))
    }

    /// Wrap an already opened factory.
    pub fn from_factory(factory: HandleFactory) -> Self {
        let stats = Arc::clone(factory.stats());
        Self {
            gate: Arc::new(RwLock::new(factory)),
            stats,
        }
    }

    /// Physical cache root.
    pub fn root(&self) -> PathBuf {
        self.gate.read().root().to_path_buf()
    }

    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Stage `source` into the cache and commit it with the current time.
    ///
    /// `source` is fully drained before the commit. With `append` the bytes
    /// are added to the end of the existing entry.
    pub fn add_content(&self, path: &CachePath, source: impl Read, append: bool) -> CacheResult<()> {
        self.add_content_with_timestamp(path, source, now_millis(), append)
    }

    /// Like [`add_content`](Self::add_content), committing with `timestamp`
    /// instead of the current time.
    pub fn add_content_with_timestamp(
        &self,
        path: &CachePath,
        mut source: impl Read,
        timestamp: i64,
        append: bool,
    ) -> CacheResult<()> {
        let mut factory = self.gate.write();
        trace!(path = %path, append, "Acquired cache write lock for add_content");

        let mut handle = factory.create_temporary_handle(path, write_mode(append))?;
        io::copy(&mut source, &mut handle)
            .map_err(|e| CacheError::io(e, path, handle.staging_path()))?;
        factory.commit(handle, timestamp)
    }

    /// Open the committed content of `path`, or `None` if there is no entry.
    pub fn get_content(&self, path: &CachePath) -> CacheResult<Option<File>> {
        self.gate.read().open_read(path)
    }

    pub fn has_content(&self, path: &CachePath) -> bool {
        self.gate.read().check_file_exists(path)
    }

    /// Modification time of the entry in milliseconds, or
    /// [`NO_TIMESTAMP`](crate::NO_TIMESTAMP) if there is none.
    pub fn get_content_timestamp(&self, path: &CachePath) -> i64 {
        self.gate.read().timestamp(path)
    }

    /// Change only the timestamp of an entry. Does nothing if the entry does
    /// not exist.
    pub fn set_content_timestamp(&self, path: &CachePath, timestamp: i64) -> CacheResult<()> {
        self.gate.write().set_timestamp(path, timestamp)
    }

    /// Delete the entry at `path` if there is one.
    pub fn remove_content(&self, path: &CachePath) -> CacheResult<()> {
        let mut factory = self.gate.write();
        if factory.check_file_exists(path) {
            factory.do_delete(path)?;
        }
        Ok(())
    }

    /// Open a stream that writes into the cache incrementally and commits
    /// when closed.
    ///
    /// In append mode the returned stream holds the cache write lock until
    /// it is closed or dropped, so concurrent appenders serialize and no
    /// reader observes a partial append. Do not read from this cache on the
    /// same thread while such a stream is open.
    pub fn wrap_output_stream(
        &self,
        path: &CachePath,
        append: bool,
        on_update: Option<UpdateCallback>,
    ) -> CacheResult<CachingOutputStream> {
        if append {
            let mut guard = self.gate.write_arc();
            let handle = guard.create_temporary_handle(path, WriteMode::Append)?;
            Ok(CachingOutputStream::holding(handle, guard, on_update))
        } else {
            let handle = self
                .gate
                .write()
                .create_temporary_handle(path, WriteMode::Replace)?;
            Ok(CachingOutputStream::deferred(
                handle,
                Arc::clone(&self.gate),
                on_update,
            ))
        }
    }

    /// Size of the committed content, or `None` if there is no entry.
    pub fn content_length(&self, path: &CachePath) -> Option<u64> {
        self.gate.read().content_length(path)
    }

    /// Whether `path` is a container holding cached entries.
    pub fn is_container(&self, path: &CachePath) -> bool {
        self.gate.read().is_container(path)
    }

    /// Names of entries and containers directly below `path`, sorted.
    pub fn list_children(&self, path: &CachePath) -> CacheResult<Vec<String>> {
        self.gate.read().list_children(path)
    }

    /// Physical locations whose deletion failed and is still pending.
    pub fn pending_deletions(&self) -> Vec<PathBuf> {
        self.gate.read().pending_deletions()
    }

    /// Retry all pending deletions now. Returns how many succeeded.
    pub fn retry_pending_deletions(&self) -> usize {
        self.gate.write().retry_pending_deletions()
    }

    /// Physical location backing `path`.
    pub fn physical_path(&self, path: &CachePath) -> CacheResult<PathBuf> {
        self.gate.read().resolve(path)
    }
}

fn write_mode(append: bool) -> WriteMode {
    if append {
        WriteMode::Append
    } else {
        WriteMode::Replace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::NO_TIMESTAMP;
    use tempfile::TempDir;

    fn cache() -> (TempDir, CacheService) {
        let dir = TempDir::new().unwrap();
        let cache = CacheService::open(CacheConfig::new(dir.path()).with_sync_on_close(false)).unwrap();
        (dir, cache)
    }

    fn path(s: &str) -> CachePath {
        s.parse().unwrap()
    }

    fn read_all(cache: &CacheService, p: &CachePath) -> Vec<u8> {
        let mut buf = Vec::new();
        cache
            .get_content(p)
            .unwrap()
            .expect("entry should exist")
            .read_to_end(&mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn test_round_trip_with_timestamp() {
        let (_dir, cache) = cache();
        let p = path("/a/b.txt");
        cache.add_content_with_timestamp(&p, &b"bytes"[..], 123_456, false).unwrap();

        assert!(cache.has_content(&p));
        assert_eq!(read_all(&cache, &p), b"bytes");
        assert_eq!(cache.get_content_timestamp(&p), 123_456);
        assert_eq!(cache.content_length(&p), Some(5));
    }

    #[test]
    fn test_absent_entry() {
        let (_dir, cache) = cache();
        let p = path("/missing");
        assert!(!cache.has_content(&p));
        assert!(cache.get_content(&p).unwrap().is_none());
        assert_eq!(cache.get_content_timestamp(&p), NO_TIMESTAMP);
        assert_eq!(cache.content_length(&p), None);
        cache.remove_content(&p).unwrap();
        cache.set_content_timestamp(&p, 1).unwrap();
        assert!(!cache.has_content(&p));
    }

    #[test]
    fn test_add_content_uses_current_time() {
        let (_dir, cache) = cache();
        let p = path("/now");
        let before = now_millis();
        cache.add_content(&p, &b"x"[..], false).unwrap();
        let ts = cache.get_content_timestamp(&p);
        // Filesystem timestamps may be truncated to whole seconds.
        assert!(ts >= before - 1_000, "{ts} < {before}");
        assert!(ts <= now_millis());
    }

    #[test]
    fn test_set_timestamp_keeps_content() {
        let (_dir, cache) = cache();
        let p = path("/t");
        cache.add_content_with_timestamp(&p, &b"unchanged"[..], 1_000, false).unwrap();
        cache.set_content_timestamp(&p, 9_000).unwrap();

        assert_eq!(cache.get_content_timestamp(&p), 9_000);
        assert_eq!(read_all(&cache, &p), b"unchanged");
    }

    #[test]
    fn test_failing_source_keeps_previous_version() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("source went away"))
            }
        }

        let (_dir, cache) = cache();
        let p = path("/safe");
        cache.add_content_with_timestamp(&p, &b"v1"[..], 10, false).unwrap();

        let err = cache.add_content_with_timestamp(&p, Broken, 20, false).unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }), "{err:?}");
        assert_eq!(read_all(&cache, &p), b"v1");
        assert_eq!(cache.get_content_timestamp(&p), 10);
        assert_eq!(cache.list_children(&CachePath::root()).unwrap(), vec!["safe".to_string()]);

        let err = cache.add_content_with_timestamp(&p, Broken, 30, true).unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }), "{err:?}");
        assert_eq!(read_all(&cache, &p), b"v1");
        assert_eq!(cache.get_content_timestamp(&p), 10);
    }

    #[test]
    fn test_invalid_paths_surface_errors() {
        let (_dir, cache) = cache();
        let err = cache
            .add_content(&CachePath::root(), &b"x"[..], false)
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidPath { .. }));
        assert!(!cache.has_content(&CachePath::root()));
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let (_dir, cache) = cache();
        let p = path("/s");
        cache.add_content(&p, &b"abc"[..], false).unwrap();
        let _ = cache.get_content(&p).unwrap();
        let _ = cache.get_content(&path("/none")).unwrap();

        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.commits, 1);
        assert_eq!(snapshot.bytes_written, 3);
    }
}
