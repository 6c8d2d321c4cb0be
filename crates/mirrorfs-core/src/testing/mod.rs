//! Testing utilities for cache and sync integration tests.
//!
//! - **Generators**: payloads that make interleaving and truncation visible
//! - **Assertions**: content verification with readable failure messages
//! - **TempCache**: a cache over a temporary directory
//!
//! # Usage
//!
//! ```
//! use mirrorfs_core::testing::{TempCache, assert_bytes_equal, random_bytes};
//!
//! let cache = TempCache::new();
//! let data = random_bytes(4096);
//! cache.put("/blob", &data, 1_000);
//! assert_bytes_equal(&cache.read("/blob"), &data, "/blob");
//! ```

pub mod assertions;
pub mod generators;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::CacheConfig;
use crate::path::CachePath;
use crate::service::CacheService;

pub use assertions::{assert_bytes_equal, assert_hash_equal, sha256};
pub use generators::{all_byte_values, labelled_record, problematic_binary, random_bytes, tagged_run};

/// A cache rooted in a temporary directory that is removed on drop.
///
/// `sync_on_close` is off to keep tests fast.
pub struct TempCache {
    pub cache: Arc<CacheService>,
    dir: TempDir,
}

impl TempCache {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Create a cache, letting the caller adjust the configuration first.
    pub fn with_config(adjust: impl FnOnce(CacheConfig) -> CacheConfig) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let config = adjust(CacheConfig::new(dir.path().join("cache")).with_sync_on_close(false));
        let cache = CacheService::open(config).expect("failed to open cache");
        Self {
            cache: Arc::new(cache),
            dir,
        }
    }

    /// Directory holding the cache root. Useful for placing other fixtures
    /// (such as a remote tree) next to the cache.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Store `data` at `path` with `timestamp`, replacing any content.
    pub fn put(&self, path: &str, data: &[u8], timestamp: i64) {
        self.cache
            .add_content_with_timestamp(&parse(path), data, timestamp, false)
            .expect("put failed");
    }

    /// Read the committed content of `path`, panicking if there is none.
    pub fn read(&self, path: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        self.cache
            .get_content(&parse(path))
            .expect("get_content failed")
            .unwrap_or_else(|| panic!("no cache entry for {path}"))
            .read_to_end(&mut buf)
            .expect("read failed");
        buf
    }
}

impl Default for TempCache {
    fn default() -> Self {
        Self::new()
    }
}

fn parse(path: &str) -> CachePath {
    path.parse()
        .unwrap_or_else(|e| panic!("invalid test path {path}: {e}"))
}
