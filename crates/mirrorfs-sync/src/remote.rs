//! Remote content store abstraction.
//!
//! The reconciler never talks to a transport directly. A provider implements
//! [`RemoteStore`] over whatever it mirrors (a directory, an object store, a
//! network service) and the reconciler drives it.

use std::io::Read;

use mirrorfs_core::CachePath;

use crate::error::SyncResult;

/// Source of truth the cache is reconciled against.
///
/// Timestamps are milliseconds since the Unix epoch, the same unit the cache
/// uses, so the two sides compare directly.
pub trait RemoteStore: Send + Sync {
    /// Whether the resource exists on the remote at all.
    fn exists(&self, path: &CachePath) -> SyncResult<bool>;

    /// Whether the resource is a container whose children are synchronized
    /// individually.
    fn is_container(&self, path: &CachePath) -> SyncResult<bool>;

    /// Names of the direct children of a container. Empty for leaves and
    /// missing resources.
    fn children(&self, path: &CachePath) -> SyncResult<Vec<String>>;

    /// Last-modified time of the resource.
    fn remote_timestamp(&self, path: &CachePath) -> SyncResult<i64>;

    /// Open the remote bytes for reading.
    fn fetch(&self, path: &CachePath) -> SyncResult<Box<dyn Read + Send>>;

    /// Replace the remote bytes with `content`.
    fn push(&self, path: &CachePath, content: &mut dyn Read) -> SyncResult<()>;

    fn set_remote_timestamp(&self, path: &CachePath, timestamp: i64) -> SyncResult<()>;
}
