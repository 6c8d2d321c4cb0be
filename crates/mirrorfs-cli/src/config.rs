//! CLI configuration file.
//!
//! Read from `config.toml` in the platform config directory
//! (`~/.config/mirrorfs/` on Linux), or from the directory named by
//! `MIRRORFS_CONFIG_DIR`. Command-line flags take precedence over every
//! value here.
//!
//! ```toml
//! cache_root = "/var/cache/mirrorfs"
//! remote_root = "/srv/mirror"
//! sync_on_close = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Cache directory used when `--cache` is not given.
    pub cache_root: Option<PathBuf>,
    /// Remote directory used by `sync` when `--remote` is not given.
    pub remote_root: Option<PathBuf>,
    /// Flush staged content to disk before committing.
    pub sync_on_close: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            remote_root: None,
            sync_on_close: true,
        }
    }
}

impl CliConfig {
    /// Load the config from `explicit`, or from the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

/// `config.toml` in `MIRRORFS_CONFIG_DIR` or the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("MIRRORFS_CONFIG_DIR") {
        return Some(PathBuf::from(dir).join(CONFIG_FILE));
    }
    directories::ProjectDirs::from("com", "mirrorfs", "mirrorfs")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: CliConfig = toml::from_str(
            r#"
            cache_root = "/var/cache/mirrorfs"
            remote_root = "/srv/mirror"
            sync_on_close = false
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_root, Some(PathBuf::from("/var/cache/mirrorfs")));
        assert_eq!(config.remote_root, Some(PathBuf::from("/srv/mirror")));
        assert!(!config.sync_on_close);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert!(config.cache_root.is_none());
        assert!(config.sync_on_close);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
