//! Write-through stream that commits into the cache when closed.
//!
//! A [`CachingOutputStream`] wraps a [`TemporaryHandle`]. Bytes go straight
//! to the staging file; nothing is visible to readers until
//! [`close`](CachingOutputStream::close) commits the handle. Dropping the
//! stream (or calling [`abort`](CachingOutputStream::abort)) abandons the
//! write and the previously committed content stays visible.
//!
//! # Locking
//!
//! Append streams write into the committed file itself, so they keep the
//! cache write lock for their whole lifetime. Replace streams write into a
//! private staging file and take the lock again only to commit.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::lock_api::ArcRwLockWriteGuard;
use parking_lot::{RawRwLock, RwLock};
use tracing::{debug, trace};

use crate::error::{CacheError, CacheResult};
use crate::factory::{HandleFactory, TemporaryHandle};
use crate::path::CachePath;
use crate::timestamp::now_millis;

/// Invoked with the entry path after a successful commit.
pub type UpdateCallback = Box<dyn FnOnce(&CachePath) + Send>;

enum CommitGate {
    /// Write lock held since the stream was opened.
    Held(ArcRwLockWriteGuard<RawRwLock, HandleFactory>),
    /// Lock taken only for the commit.
    Deferred(Arc<RwLock<HandleFactory>>),
}

/// Output stream bound to one cache entry.
pub struct CachingOutputStream {
    // Declared before `gate` so an abandoned handle is cleaned up while an
    // append stream still holds the lock.
    handle: TemporaryHandle,
    gate: CommitGate,
    on_update: Option<UpdateCallback>,
    poisoned: Option<io::ErrorKind>,
}

impl CachingOutputStream {
    pub(crate) fn holding(
        handle: TemporaryHandle,
        guard: ArcRwLockWriteGuard<RawRwLock, HandleFactory>,
        on_update: Option<UpdateCallback>,
    ) -> Self {
        trace!(entry = %handle.entry(), "Opened append stream holding cache write lock");
        Self {
            handle,
            gate: CommitGate::Held(guard),
            on_update,
            poisoned: None,
        }
    }

    pub(crate) fn deferred(
        handle: TemporaryHandle,
        gate: Arc<RwLock<HandleFactory>>,
        on_update: Option<UpdateCallback>,
    ) -> Self {
        trace!(entry = %handle.entry(), "Opened replace stream");
        Self {
            handle,
            gate: CommitGate::Deferred(gate),
            on_update,
            poisoned: None,
        }
    }

    #[inline]
    pub fn entry(&self) -> &CachePath {
        self.handle.entry()
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.handle.bytes_written()
    }

    /// Commit everything written so far with the current time, release the
    /// cache lock and run the update callback.
    ///
    /// If an earlier write failed, nothing is committed and the write error
    /// is returned.
    pub fn close(self) -> CacheResult<()> {
        let Self {
            handle,
            gate,
            on_update,
            poisoned,
        } = self;
        let entry = handle.entry().clone();

        if let Some(kind) = poisoned {
            let staging = handle.staging_path().to_path_buf();
            drop(handle);
            drop(gate);
            return Err(CacheError::io(
                io::Error::new(kind, "an earlier write to this stream failed"),
                &entry,
                &staging,
            ));
        }

        let timestamp = now_millis();
        match gate {
            CommitGate::Held(mut guard) => guard.commit(handle, timestamp)?,
            CommitGate::Deferred(lock) => lock.write().commit(handle, timestamp)?,
        }

        if let Some(callback) = on_update {
            callback(&entry);
        }
        Ok(())
    }

    /// Abandon the write. Previously committed content stays visible.
    pub fn abort(self) {
        debug!(entry = %self.handle.entry(), "Aborting cache output stream");
    }
}

impl Write for CachingOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle.write(buf).inspect_err(|e| {
            self.poisoned.get_or_insert(e.kind());
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle.flush().inspect_err(|e| {
            self.poisoned.get_or_insert(e.kind());
        })
    }
}

impl fmt::Debug for CachingOutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingOutputStream")
            .field("entry", self.handle.entry())
            .field("mode", &self.handle.mode())
            .field("holds_lock", &matches!(self.gate, CommitGate::Held(_)))
            .field("has_callback", &self.on_update.is_some())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::service::CacheService;
    use std::io::Read;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cache() -> (TempDir, Arc<CacheService>) {
        let dir = TempDir::new().unwrap();
        let cache = CacheService::open(CacheConfig::new(dir.path()).with_sync_on_close(false)).unwrap();
        (dir, Arc::new(cache))
    }

    fn path(s: &str) -> CachePath {
        s.parse().unwrap()
    }

    fn read_all(cache: &CacheService, p: &CachePath) -> Vec<u8> {
        let mut buf = Vec::new();
        cache.get_content(p).unwrap().unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_close_commits_and_notifies() {
        let (_dir, cache) = cache();
        let p = path("/doc.txt");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let expected = p.clone();

        let mut stream = cache
            .wrap_output_stream(
                &p,
                false,
                Some(Box::new(move |entry: &CachePath| {
                    assert_eq!(entry, &expected);
                    seen.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
        stream.write_all(b"hello ").unwrap();
        stream.write_all(b"world").unwrap();
        assert_eq!(stream.bytes_written(), 11);
        assert!(!cache.has_content(&p), "nothing visible before close");

        stream.close().unwrap();
        assert_eq!(read_all(&cache, &p), b"hello world");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_abort_keeps_previous_content() {
        let (_dir, cache) = cache();
        let p = path("/doc.txt");
        cache.add_content_with_timestamp(&p, &b"v1"[..], 50, false).unwrap();

        let mut stream = cache.wrap_output_stream(&p, false, None).unwrap();
        stream.write_all(b"v2 partial").unwrap();
        stream.abort();

        assert_eq!(read_all(&cache, &p), b"v1");
        assert_eq!(cache.get_content_timestamp(&p), 50);
        assert_eq!(cache.list_children(&CachePath::root()).unwrap(), vec!["doc.txt".to_string()]);
    }

    #[test]
    fn test_dropped_append_stream_releases_lock_and_rolls_back() {
        let (_dir, cache) = cache();
        let p = path("/log");
        cache.add_content_with_timestamp(&p, &b"one\n"[..], 50, true).unwrap();

        {
            let mut stream = cache.wrap_output_stream(&p, true, None).unwrap();
            stream.write_all(b"two\n").unwrap();
        }

        assert_eq!(read_all(&cache, &p), b"one\n");
        assert_eq!(cache.get_content_timestamp(&p), 50);
        assert_eq!(cache.stats().snapshot().abandoned_writes, 1);
    }

    #[test]
    fn test_append_stream_close_appends() {
        let (_dir, cache) = cache();
        let p = path("/log");
        cache.add_content(&p, &b"one\n"[..], true).unwrap();

        let mut stream = cache.wrap_output_stream(&p, true, None).unwrap();
        stream.write_all(b"two\n").unwrap();
        stream.close().unwrap();

        assert_eq!(read_all(&cache, &p), b"one\ntwo\n");
    }

    #[test]
    fn test_append_stream_blocks_other_writers() {
        let (_dir, cache) = cache();
        let p = path("/log");

        let mut stream = cache.wrap_output_stream(&p, true, None).unwrap();
        stream.write_all(b"first;").unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let cache = Arc::clone(&cache);
            let done = Arc::clone(&done);
            let p = p.clone();
            thread::spawn(move || {
                cache.add_content(&p, &b"second;"[..], true).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst), "writer must wait for the open append stream");

        stream.write_all(b"more;").unwrap();
        stream.close().unwrap();
        writer.join().unwrap();

        assert_eq!(read_all(&cache, &p), b"first;more;second;");
    }

    #[test]
    fn test_failed_commit_skips_callback() {
        let (_dir, cache) = cache();
        let p = path("/slot/file");
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        let mut stream = cache
            .wrap_output_stream(&p, false, Some(Box::new(move |_: &CachePath| flag.store(true, Ordering::SeqCst))))
            .unwrap();
        stream.write_all(b"data").unwrap();

        // Turn the target into a non-empty directory so the commit cannot
        // delete it.
        let target = cache.physical_path(&p).unwrap();
        std::fs::create_dir_all(target.join("blocker")).unwrap();

        let err = stream.close().unwrap_err();
        assert!(matches!(err, CacheError::Delete { .. }), "{err:?}");
        assert!(!called.load(Ordering::SeqCst));
        assert!(!cache.has_content(&p));
    }

    #[test]
    fn test_poisoned_stream_refuses_to_commit() {
        let (_dir, cache) = cache();
        let p = path("/x");
        let mut stream = cache.wrap_output_stream(&p, false, None).unwrap();
        stream.write_all(b"ok").unwrap();
        stream.poisoned = Some(io::ErrorKind::StorageFull);

        let err = stream.close().unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }), "{err:?}");
        assert!(!cache.has_content(&p));
    }
}
