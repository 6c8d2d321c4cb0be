//! Error types for the sync layer.

use std::fmt;
use std::io;

use mirrorfs_core::{CacheError, CachePath};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote store reported a failure.
    #[error("remote error for '{path}': {message}")]
    Remote { path: CachePath, message: String },

    /// The local cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// I/O against a remote tree failed.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: CachePath,
        #[source]
        source: io::Error,
    },

    /// The pass was cancelled before this resource was visited.
    #[error("synchronization cancelled at '{path}'")]
    Cancelled { path: CachePath },

    /// Several resources failed; each failure is listed.
    #[error("{0}")]
    Multiple(MultiStatus),
}

impl SyncError {
    pub fn remote(path: &CachePath, message: impl Into<String>) -> Self {
        Self::Remote {
            path: path.clone(),
            message: message.into(),
        }
    }

    pub fn io(path: &CachePath, source: io::Error) -> Self {
        Self::Io {
            path: path.clone(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// One resource that failed to synchronize.
#[derive(Debug)]
pub struct SyncFailure {
    pub path: CachePath,
    pub error: SyncError,
}

/// Per-resource failures collected over a traversal.
///
/// A container pass keeps going after a child fails; the failures end up
/// here instead of aborting the walk.
#[derive(Debug, Default)]
pub struct MultiStatus {
    failures: Vec<SyncFailure>,
}

impl MultiStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &CachePath, error: SyncError) {
        self.failures.push(SyncFailure {
            path: path.clone(),
            error,
        });
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[SyncFailure] {
        &self.failures
    }

    /// `Ok(())` when nothing failed, otherwise [`SyncError::Multiple`].
    pub fn into_result(self) -> SyncResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SyncError::Multiple(self))
        }
    }
}

impl fmt::Display for MultiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resource(s) failed to synchronize", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.path, failure.error)?;
        }
        Ok(())
    }
}
