//! Crash-safe content cache for a virtual file system.
//!
//! Byte content for path-addressed resources is stored in a directory tree
//! that mirrors the logical hierarchy. Every write is staged and committed
//! in one step, so readers only ever see a complete version of an entry.
//!
//! # Components
//!
//! - [`CacheService`] - Path-addressed content operations behind one
//!   cache-wide reader/writer gate
//! - [`HandleFactory`] - Physical layout, staging files, atomic commits and
//!   failed-deletion bookkeeping
//! - [`CachingOutputStream`] - Incremental writer that commits on close
//! - [`FailedDeletionSet`] - Persisted record of deletions awaiting retry
//! - [`CachePath`] - Validated logical path
//! - [`CacheStats`] - Lock-free activity counters
//!
//! # Commit protocol
//!
//! Replace-mode writes go to a sibling staging file (`<name>.mirrorfs-tmp<n>`)
//! that is renamed over the target on commit. Append-mode writes extend the
//! committed file directly while the writer holds the cache gate. Either way
//! the modification time is set to the commit timestamp afterwards.
//!
//! Deletions that fail are recorded under the cache root and treated as
//! logically complete. The next existence check for that entry retries the
//! deletion and reports the entry as absent whether or not the retry worked.
//!
//! # Example
//!
//! ```
//! use mirrorfs_core::{CacheConfig, CachePath, CacheService};
//! use std::io::Write;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let cache = CacheService::open(CacheConfig::new(dir.path())).unwrap();
//! let log: CachePath = "/logs/app.log".parse().unwrap();
//!
//! let mut stream = cache.wrap_output_stream(&log, true, None).unwrap();
//! stream.write_all(b"started\n").unwrap();
//! stream.close().unwrap();
//!
//! assert_eq!(cache.content_length(&log), Some(8));
//! ```

pub mod config;
pub mod deletion;
pub mod error;
pub mod factory;
pub mod path;
pub mod service;
pub mod stats;
pub mod stream;
pub mod testing;
pub mod timestamp;

pub use config::{CacheConfig, DEFAULT_DELETION_RECORD, DEFAULT_STAGING_SUFFIX};
pub use deletion::FailedDeletionSet;
pub use error::{CacheError, CacheOpContext, CacheResult};
pub use factory::{HandleFactory, TemporaryHandle, WriteMode};
pub use path::CachePath;
pub use service::CacheService;
pub use stats::{CacheStats, CacheStatsSnapshot, format_bytes};
pub use stream::{CachingOutputStream, UpdateCallback};
pub use timestamp::{NO_TIMESTAMP, now_millis};
