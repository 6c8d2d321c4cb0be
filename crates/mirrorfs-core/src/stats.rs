//! Statistics for cache activity.
//!
//! All counters are lock-free atomics so they can be bumped from reader
//! paths without touching the cache gate.
//!
//! ```
//! use mirrorfs_core::CacheStats;
//!
//! let stats = CacheStats::new();
//! stats.record_hit();
//! stats.record_miss();
//! stats.record_commit(4096);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.commits, 1);
//! assert!((snapshot.hit_rate() - 0.5).abs() < f64::EPSILON);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters for cache operations.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups that found a committed entry.
    pub hits: AtomicU64,
    /// Lookups that found nothing.
    pub misses: AtomicU64,
    /// Successful commits (replace and append).
    pub commits: AtomicU64,
    /// Bytes drained into staging files by `add_content`.
    pub bytes_written: AtomicU64,
    /// Successful deletions of committed files.
    pub deletions: AtomicU64,
    /// Deletion attempts that failed and were recorded.
    pub failed_deletions: AtomicU64,
    /// Recorded deletions that later succeeded on retry.
    pub healed_deletions: AtomicU64,
    /// Writes that were abandoned before commit.
    pub abandoned_writes: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_commit(&self, bytes: u64) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_deletion(&self) {
        self.deletions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed_deletion(&self) {
        self.failed_deletions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_healed_deletion(&self) {
        self.healed_deletions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_abandoned_write(&self) {
        self.abandoned_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.commits,
            &self.bytes_written,
            &self.deletions,
            &self.failed_deletions,
            &self.healed_deletions,
            &self.abandoned_writes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Create a snapshot of current values.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            failed_deletions: self.failed_deletions.load(Ordering::Relaxed),
            healed_deletions: self.healed_deletions.load(Ordering::Relaxed),
            abandoned_writes: self.abandoned_writes.load(Ordering::Relaxed),
        }
    }
}

/// A serializable snapshot of cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub commits: u64,
    pub bytes_written: u64,
    pub deletions: u64,
    pub failed_deletions: u64,
    pub healed_deletions: u64,
    pub abandoned_writes: u64,
}

impl CacheStatsSnapshot {
    /// Compute the lookup hit rate as a fraction (0.0 to 1.0).
    ///
    /// Returns 0.0 if no lookups have been performed.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Format a byte count for display (e.g. "1.50 MB").
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
