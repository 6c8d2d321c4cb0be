//! Error types for cache operations.
//!
//! Every variant carries enough context to name the logical entry and the
//! physical file involved, so callers can tell "no such entry" apart from
//! "the operation failed" without inspecting the source error.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::path::CachePath;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Context attached to a failed cache operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOpContext {
    /// The logical entry path
    pub entry: Option<CachePath>,
    /// The physical file on disk
    pub physical: Option<PathBuf>,
}

impl CacheOpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, entry: &CachePath) -> Self {
        self.entry = Some(entry.clone());
        self
    }

    pub fn with_physical(mut self, path: impl Into<PathBuf>) -> Self {
        self.physical = Some(path.into());
        self
    }

    /// Convert this context into a Box (for use in error types)
    #[inline]
    pub fn into_box(self) -> Box<Self> {
        Box::new(self)
    }
}

impl fmt::Display for CacheOpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.entry, &self.physical) {
            (Some(entry), Some(physical)) => {
                write!(f, "entry '{entry}' at {:?}", physical.display())
            }
            (Some(entry), None) => write!(f, "entry '{entry}'"),
            (None, Some(physical)) => write!(f, "{:?}", physical.display()),
            (None, None) => write!(f, "(no context)"),
        }
    }
}

/// Errors raised by the cache service and its handle factory.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A staging or cache file could not be opened or created.
    #[error("Failed to create cache file for {context}: {source}")]
    CreateFile {
        #[source]
        source: io::Error,
        context: Box<CacheOpContext>,
    },

    /// The staged file could not be renamed onto its target. The staging
    /// file is left in place and swept on the next open.
    #[error("Failed to commit staged content for {context}: {source}")]
    Rename {
        #[source]
        source: io::Error,
        context: Box<CacheOpContext>,
    },

    /// A committed cache file could not be deleted. The location has been
    /// recorded and the deletion is retried lazily.
    #[error("Failed to delete cache file for {context}: {source}")]
    Delete {
        #[source]
        source: io::Error,
        context: Box<CacheOpContext>,
    },

    /// The failed-deletion record could not be read or written.
    #[error("Failed to access deletion record {context}: {source}")]
    MetadataIo {
        #[source]
        source: io::Error,
        context: Box<CacheOpContext>,
    },

    /// Any other I/O failure (draining a source stream, opening for read,
    /// updating a timestamp).
    #[error("IO error for {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: Box<CacheOpContext>,
    },

    #[error("Invalid cache path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("No cache entry for '{path}'")]
    NotFound { path: CachePath },

    #[error("Invalid cache configuration: {reason}")]
    Config { reason: String },
}

impl CacheError {
    pub(crate) fn create_file(source: io::Error, entry: &CachePath, physical: &Path) -> Self {
        Self::CreateFile {
            source,
            context: CacheOpContext::new()
                .with_entry(entry)
                .with_physical(physical)
                .into_box(),
        }
    }

    pub(crate) fn rename(source: io::Error, entry: &CachePath, physical: &Path) -> Self {
        Self::Rename {
            source,
            context: CacheOpContext::new()
                .with_entry(entry)
                .with_physical(physical)
                .into_box(),
        }
    }

    pub(crate) fn delete(source: io::Error, entry: &CachePath, physical: &Path) -> Self {
        Self::Delete {
            source,
            context: CacheOpContext::new()
                .with_entry(entry)
                .with_physical(physical)
                .into_box(),
        }
    }

    pub(crate) fn metadata_io(source: io::Error, record: &Path) -> Self {
        Self::MetadataIo {
            source,
            context: CacheOpContext::new().with_physical(record).into_box(),
        }
    }

    pub(crate) fn io(source: io::Error, entry: &CachePath, physical: &Path) -> Self {
        Self::Io {
            source,
            context: CacheOpContext::new()
                .with_entry(entry)
                .with_physical(physical)
                .into_box(),
        }
    }

    /// The logical entry this error refers to, if any.
    pub fn entry(&self) -> Option<&CachePath> {
        match self {
            Self::CreateFile { context, .. }
            | Self::Rename { context, .. }
            | Self::Delete { context, .. }
            | Self::MetadataIo { context, .. }
            | Self::Io { context, .. } => context.entry.as_ref(),
            Self::NotFound { path } => Some(path),
            Self::InvalidPath { .. } | Self::Config { .. } => None,
        }
    }

    /// Whether this error means the entry does not exist, as opposed to an
    /// operation failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
