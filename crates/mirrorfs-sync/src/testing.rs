//! In-memory remote store for tests.
//!
//! [`MemoryRemote`] keeps every resource in a map and counts transfer calls,
//! so tests can assert not just on the resulting state but on whether the
//! reconciler touched the remote at all.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

use mirrorfs_core::{CachePath, NO_TIMESTAMP};
use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Vec<u8>,
    timestamp: i64,
}

/// A [`RemoteStore`] held entirely in memory.
///
/// Containers are implicit: a path is a container when some entry lies
/// below it.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    entries: Mutex<BTreeMap<CachePath, MemoryEntry>>,
    failing: Mutex<BTreeSet<CachePath>>,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
    timestamp_updates: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a resource on the remote without counting it as a push.
    pub fn insert(&self, path: &CachePath, data: &[u8], timestamp: i64) {
        self.entries.lock().insert(
            path.clone(),
            MemoryEntry {
                data: data.to_vec(),
                timestamp,
            },
        );
    }

    /// Content and timestamp of a resource, if present.
    pub fn content(&self, path: &CachePath) -> Option<(Vec<u8>, i64)> {
        self.entries
            .lock()
            .get(path)
            .map(|entry| (entry.data.clone(), entry.timestamp))
    }

    /// Make every transfer touching `path` fail with a remote error.
    pub fn fail_on(&self, path: &CachePath) {
        self.failing.lock().insert(path.clone());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn timestamp_update_count(&self) -> usize {
        self.timestamp_updates.load(Ordering::SeqCst)
    }

    fn check_failure(&self, path: &CachePath) -> SyncResult<()> {
        if self.failing.lock().contains(path) {
            return Err(SyncError::remote(path, "injected failure"));
        }
        Ok(())
    }

    fn has_descendants(entries: &BTreeMap<CachePath, MemoryEntry>, path: &CachePath) -> bool {
        entries
            .keys()
            .any(|key| key.depth() > path.depth() && key.starts_with(path))
    }
}

impl RemoteStore for MemoryRemote {
    fn exists(&self, path: &CachePath) -> SyncResult<bool> {
        let entries = self.entries.lock();
        Ok(entries.contains_key(path) || Self::has_descendants(&entries, path))
    }

    fn is_container(&self, path: &CachePath) -> SyncResult<bool> {
        let entries = self.entries.lock();
        Ok(!entries.contains_key(path) && Self::has_descendants(&entries, path))
    }

    fn children(&self, path: &CachePath) -> SyncResult<Vec<String>> {
        let entries = self.entries.lock();
        let names: BTreeSet<String> = entries
            .keys()
            .filter(|key| key.depth() > path.depth() && key.starts_with(path))
            .map(|key| key.segments()[path.depth()].clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    fn remote_timestamp(&self, path: &CachePath) -> SyncResult<i64> {
        Ok(self
            .entries
            .lock()
            .get(path)
            .map_or(NO_TIMESTAMP, |entry| entry.timestamp))
    }

    fn fetch(&self, path: &CachePath) -> SyncResult<Box<dyn Read + Send>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failure(path)?;
        let data = self
            .entries
            .lock()
            .get(path)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| SyncError::remote(path, "no such remote resource"))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn push(&self, path: &CachePath, content: &mut dyn Read) -> SyncResult<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.check_failure(path)?;
        let mut data = Vec::new();
        content
            .read_to_end(&mut data)
            .map_err(|e| SyncError::io(path, e))?;

        let mut entries = self.entries.lock();
        let timestamp = entries.get(path).map_or(NO_TIMESTAMP, |entry| entry.timestamp);
        entries.insert(path.clone(), MemoryEntry { data, timestamp });
        Ok(())
    }

    fn set_remote_timestamp(&self, path: &CachePath, timestamp: i64) -> SyncResult<()> {
        self.timestamp_updates.fetch_add(1, Ordering::SeqCst);
        match self.entries.lock().get_mut(path) {
            Some(entry) => {
                entry.timestamp = timestamp;
                Ok(())
            }
            None => Err(SyncError::remote(path, "no such remote resource")),
        }
    }
}
