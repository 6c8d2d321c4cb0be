//! Cache configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Default name of the failed-deletion record kept at the cache root.
pub const DEFAULT_DELETION_RECORD: &str = ".mirrorfs-deletions";

/// Default suffix marking replace-mode staging files.
pub const DEFAULT_STAGING_SUFFIX: &str = ".mirrorfs-tmp";

/// Configuration for a [`CacheService`](crate::CacheService).
///
/// Deserializes from any serde format; every field except `root` has a
/// default.
///
/// ```
/// use mirrorfs_core::CacheConfig;
///
/// let config = CacheConfig::new("/var/cache/mirrorfs").with_sync_on_close(false);
/// assert_eq!(config.staging_suffix, ".mirrorfs-tmp");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the cached content tree.
    pub root: PathBuf,
    /// File name of the failed-deletion record below `root`.
    pub deletion_record: String,
    /// Reserved suffix for staging files; entry names may not contain it.
    pub staging_suffix: String,
    /// Flush staged bytes to stable storage before committing.
    pub sync_on_close: bool,
    /// Remove staging files left behind by an earlier process on open.
    pub sweep_on_open: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            deletion_record: DEFAULT_DELETION_RECORD.to_string(),
            staging_suffix: DEFAULT_STAGING_SUFFIX.to_string(),
            sync_on_close: true,
            sweep_on_open: true,
        }
    }
}

impl CacheConfig {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_staging_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.staging_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn with_deletion_record(mut self, name: impl Into<String>) -> Self {
        self.deletion_record = name.into();
        self
    }

    #[must_use]
    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    #[must_use]
    pub fn with_sweep_on_open(mut self, sweep: bool) -> Self {
        self.sweep_on_open = sweep;
        self
    }

    /// Path of the failed-deletion record.
    pub fn deletion_record_path(&self) -> PathBuf {
        self.root.join(&self.deletion_record)
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(CacheError::Config {
                reason: "cache root must be set".to_string(),
            });
        }
        for (field, value) in [
            ("deletion_record", &self.deletion_record),
            ("staging_suffix", &self.staging_suffix),
        ] {
            if value.is_empty() {
                return Err(CacheError::Config {
                    reason: format!("{field} must not be empty"),
                });
            }
            if value.contains(['/', '\\', '\0']) {
                return Err(CacheError::Config {
                    reason: format!("{field} '{value}' must be a plain file name"),
                });
            }
        }
        if self.deletion_record.contains(&self.staging_suffix) {
            return Err(CacheError::Config {
                reason: "deletion_record must not contain the staging suffix".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: CacheConfig = serde_json::from_str(r#"{"root": "/tmp/cache"}"#).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/cache"));
        assert_eq!(config.deletion_record, DEFAULT_DELETION_RECORD);
        assert_eq!(config.staging_suffix, DEFAULT_STAGING_SUFFIX);
        assert!(config.sync_on_close);
        assert!(config.sweep_on_open);
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(CacheConfig::default().validate().is_err());
        assert!(CacheConfig::new("/c").with_staging_suffix("").validate().is_err());
        assert!(CacheConfig::new("/c").with_deletion_record("a/b").validate().is_err());
        assert!(
            CacheConfig::new("/c")
                .with_deletion_record("x.mirrorfs-tmp")
                .validate()
                .is_err()
        );
        assert!(CacheConfig::new("/c").validate().is_ok());
    }

    #[test]
    fn test_record_path() {
        let config = CacheConfig::new("/c").with_deletion_record("pending");
        assert_eq!(config.deletion_record_path(), PathBuf::from("/c/pending"));
    }
}
