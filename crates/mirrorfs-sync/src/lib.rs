//! Synchronization between a mirrorfs cache and a remote source of truth.
//!
//! The [`Reconciler`] compares local and remote modification times and
//! pulls, pushes or leaves each resource alone according to the requested
//! [`SyncDirection`]. Remote access goes through the [`RemoteStore`] trait;
//! [`DirectoryRemote`] mirrors a local directory tree.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mirrorfs_core::{CacheConfig, CachePath, CacheService};
//! use mirrorfs_sync::{DirectoryRemote, Reconciler, SyncDirection};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::create_dir_all(dir.path().join("remote/docs")).unwrap();
//! std::fs::write(dir.path().join("remote/docs/a.txt"), b"remote bytes").unwrap();
//!
//! let cache = Arc::new(CacheService::open(CacheConfig::new(dir.path().join("cache"))).unwrap());
//! let remote = Arc::new(DirectoryRemote::new(dir.path().join("remote")).unwrap());
//! let reconciler = Reconciler::new(Arc::clone(&cache), remote);
//!
//! let report = reconciler.synchronize(&CachePath::root(), SyncDirection::Incoming);
//! assert_eq!(report.pulled, 1);
//! assert!(cache.has_content(&"/docs/a.txt".parse().unwrap()));
//! ```

pub mod direction;
pub mod directory;
pub mod error;
pub mod reconciler;
pub mod remote;
pub mod testing;

pub use direction::SyncDirection;
pub use directory::DirectoryRemote;
pub use error::{MultiStatus, SyncError, SyncFailure, SyncResult};
pub use reconciler::{CancellationFlag, LeafOutcome, Reconciler, SyncReport};
pub use remote::RemoteStore;
