//! Timestamp-driven reconciliation between the cache and a remote store.
//!
//! For a leaf resource the reconciler decides between three outcomes:
//!
//! - **Pull**: replace the cached entry with the remote bytes and the
//!   remote timestamp.
//! - **Push**: send the cached bytes to the remote and copy the cached
//!   timestamp over.
//! - **Nothing**: the resource is local-only, or both sides carry the same
//!   timestamp.
//!
//! With [`SyncDirection::Both`] the newer side wins. Equal timestamps count
//! as in sync even if the bytes differ; content is never hashed.
//!
//! Containers are walked recursively. A failing child is recorded in the
//! report's [`MultiStatus`] and the walk continues with its siblings.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mirrorfs_core::{CacheError, CachePath, CacheService, NO_TIMESTAMP};
use serde::Serialize;
use tracing::{debug, info, instrument, trace};

use crate::direction::SyncDirection;
use crate::error::{MultiStatus, SyncError, SyncResult};
use crate::remote::RemoteStore;

/// Shared flag that stops a running pass between resources.
pub type CancellationFlag = Arc<AtomicBool>;

/// What happened to a single leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafOutcome {
    Pulled,
    Pushed,
    Unchanged,
    /// Local-only, or absent on the side that would have to provide bytes.
    Skipped,
}

/// Summary of one synchronization pass.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub pulled: usize,
    pub pushed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Whether the pass stopped early because it was cancelled.
    pub cancelled: bool,
    #[serde(skip)]
    pub status: MultiStatus,
}

impl SyncReport {
    /// Number of leaves visited, including failed ones.
    pub fn visited(&self) -> usize {
        self.pulled + self.pushed + self.unchanged + self.skipped + self.status.len()
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    fn record(&mut self, outcome: LeafOutcome) {
        match outcome {
            LeafOutcome::Pulled => self.pulled += 1,
            LeafOutcome::Pushed => self.pushed += 1,
            LeafOutcome::Unchanged => self.unchanged += 1,
            LeafOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Reconciles a [`CacheService`] against a [`RemoteStore`].
pub struct Reconciler {
    cache: Arc<CacheService>,
    remote: Arc<dyn RemoteStore>,
    cancel: Option<CancellationFlag>,
}

impl Reconciler {
    pub fn new(cache: Arc<CacheService>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            cache,
            remote,
            cancel: None,
        }
    }

    /// Check `flag` between resources and stop the pass once it is set.
    #[must_use]
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    /// Synchronize `path` (and, for containers, everything below it).
    ///
    /// Never fails as a whole: per-resource failures are collected in the
    /// returned report. Use `report.status.into_result()` to turn them into
    /// a single [`SyncError::Multiple`].
    #[instrument(level = "info", name = "sync", skip_all, fields(path = %path, direction = %direction))]
    pub fn synchronize(&self, path: &CachePath, direction: SyncDirection) -> SyncReport {
        let mut report = SyncReport::default();
        self.visit(path, direction, &mut report);
        info!(
            pulled = report.pulled,
            pushed = report.pushed,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.status.len(),
            cancelled = report.cancelled,
            "Synchronization pass finished"
        );
        report
    }

    /// Synchronize a single leaf, returning what was done.
    pub fn synchronize_leaf(&self, path: &CachePath, direction: SyncDirection) -> SyncResult<LeafOutcome> {
        let exists_remotely = self.remote.exists(path)?;
        let local_ts = self.cache.get_content_timestamp(path);

        if !exists_remotely {
            if direction == SyncDirection::Outgoing && local_ts != NO_TIMESTAMP {
                return self.push(path, local_ts);
            }
            trace!(path = %path, "No remote counterpart, leaving local state alone");
            return Ok(LeafOutcome::Skipped);
        }

        let resolved = match direction {
            SyncDirection::Both => {
                let remote_ts = self.remote.remote_timestamp(path)?;
                match remote_ts.cmp(&local_ts) {
                    CmpOrdering::Greater => return self.pull(path, remote_ts),
                    CmpOrdering::Less => SyncDirection::Outgoing,
                    CmpOrdering::Equal => {
                        trace!(path = %path, timestamp = local_ts, "Timestamps match");
                        return Ok(LeafOutcome::Unchanged);
                    }
                }
            }
            other => other,
        };

        match resolved {
            SyncDirection::Outgoing => self.push(path, local_ts),
            _ => {
                let remote_ts = self.remote.remote_timestamp(path)?;
                self.pull(path, remote_ts)
            }
        }
    }

    fn visit(&self, path: &CachePath, direction: SyncDirection, report: &mut SyncReport) {
        if self.is_cancelled() {
            report.cancelled = true;
            report.status.add(path, SyncError::Cancelled { path: path.clone() });
            return;
        }

        match self.children_of(path, direction) {
            Ok(Some(children)) => {
                for name in children {
                    if report.cancelled {
                        return;
                    }
                    match path.child(&name) {
                        Ok(child) => self.visit(&child, direction, report),
                        Err(e) => report.status.add(path, e.into()),
                    }
                }
            }
            Ok(None) => match self.synchronize_leaf(path, direction) {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    debug!(path = %path, error = %e, "Resource failed to synchronize");
                    report.status.add(path, e);
                }
            },
            Err(e) => report.status.add(path, e),
        }
    }

    /// Children to visit if `path` is a container on either side, `None`
    /// for leaves. Remote children are included when pulling, cached ones
    /// when pushing.
    fn children_of(&self, path: &CachePath, direction: SyncDirection) -> SyncResult<Option<BTreeSet<String>>> {
        let remote_container = path.is_root() || self.remote.is_container(path)?;
        let local_container = self.cache.is_container(path);
        if !remote_container && !local_container {
            return Ok(None);
        }

        let mut children = BTreeSet::new();
        if direction.pulls() && remote_container {
            children.extend(self.remote.children(path)?);
        }
        if direction.pushes() && local_container {
            children.extend(self.cache.list_children(path)?);
        }
        Ok(Some(children))
    }

    fn pull(&self, path: &CachePath, remote_ts: i64) -> SyncResult<LeafOutcome> {
        let source = self.remote.fetch(path)?;
        // Replace mode: the commit deletes the old entry and installs the
        // fetched bytes in one step.
        self.cache
            .add_content_with_timestamp(path, source, remote_ts, false)?;
        debug!(path = %path, timestamp = remote_ts, "Pulled remote content");
        Ok(LeafOutcome::Pulled)
    }

    fn push(&self, path: &CachePath, local_ts: i64) -> SyncResult<LeafOutcome> {
        let mut content = self
            .cache
            .get_content(path)?
            .ok_or_else(|| CacheError::NotFound { path: path.clone() })?;
        self.remote.push(path, &mut content)?;
        self.remote.set_remote_timestamp(path, local_ts)?;
        debug!(path = %path, timestamp = local_ts, "Pushed cached content");
        Ok(LeafOutcome::Pushed)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRemote;
    use mirrorfs_core::testing::TempCache;

    fn path(s: &str) -> CachePath {
        s.parse().unwrap()
    }

    fn setup() -> (TempCache, Arc<MemoryRemote>, Reconciler) {
        let temp = TempCache::new();
        let remote = Arc::new(MemoryRemote::new());
        let reconciler = Reconciler::new(Arc::clone(&temp.cache), Arc::clone(&remote) as Arc<dyn RemoteStore>);
        (temp, remote, reconciler)
    }

    #[test]
    fn test_local_only_is_left_alone() {
        let (temp, remote, reconciler) = setup();
        temp.put("/mine", b"local", 10);

        for direction in [SyncDirection::Incoming, SyncDirection::Both] {
            let outcome = reconciler.synchronize_leaf(&path("/mine"), direction).unwrap();
            assert_eq!(outcome, LeafOutcome::Skipped);
        }
        assert_eq!(temp.read("/mine"), b"local");
        assert_eq!(remote.push_count(), 0);
        assert_eq!(remote.fetch_count(), 0);
    }

    #[test]
    fn test_outgoing_publishes_local_only() {
        let (temp, remote, reconciler) = setup();
        temp.put("/new", b"fresh", 42);

        let outcome = reconciler.synchronize_leaf(&path("/new"), SyncDirection::Outgoing).unwrap();
        assert_eq!(outcome, LeafOutcome::Pushed);
        assert_eq!(remote.content(&path("/new")), Some((b"fresh".to_vec(), 42)));
    }

    #[test]
    fn test_incoming_without_either_side_skips() {
        let (_temp, _remote, reconciler) = setup();
        let outcome = reconciler.synchronize_leaf(&path("/ghost"), SyncDirection::Incoming).unwrap();
        assert_eq!(outcome, LeafOutcome::Skipped);
    }

    #[test]
    fn test_outgoing_requires_cached_content() {
        let (_temp, remote, reconciler) = setup();
        remote.insert(&path("/remote-only"), b"r", 5);

        let err = reconciler
            .synchronize_leaf(&path("/remote-only"), SyncDirection::Outgoing)
            .unwrap_err();
        assert!(matches!(err, SyncError::Cache(CacheError::NotFound { .. })), "{err:?}");
        assert_eq!(remote.push_count(), 0);
    }

    #[test]
    fn test_cancelled_pass_stops_early() {
        let (temp, remote, reconciler) = setup();
        remote.insert(&path("/a"), b"a", 5);
        temp.put("/b", b"b", 5);
        let flag = Arc::new(AtomicBool::new(true));
        let reconciler = reconciler.with_cancellation(Arc::clone(&flag));

        let report = reconciler.synchronize(&CachePath::root(), SyncDirection::Both);
        assert!(report.cancelled);
        assert_eq!(report.status.len(), 1);
        assert!(report.status.failures()[0].error.is_cancelled());
        assert_eq!(remote.fetch_count(), 0);

        flag.store(false, Ordering::Relaxed);
        let report = reconciler.synchronize(&CachePath::root(), SyncDirection::Both);
        assert!(!report.cancelled);
        assert_eq!(report.pulled, 1);
        assert_eq!(report.skipped, 1);
    }
}
