//! Persistent record of cache files whose deletion failed.
//!
//! A location is in the set exactly when the last attempt to delete it did
//! not succeed. The set is stored as a small text file at the cache root:
//!
//! ```text
//! mirrorfs-failed-deletions v1
//! /var/cache/mirrorfs/docs/report.pdf
//! /var/cache/mirrorfs/img/logo.png
//! ```
//!
//! Saving an empty set removes the file instead of writing an empty record.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{CacheError, CacheResult};

const HEADER: &str = "mirrorfs-failed-deletions v1";

/// Set of physical locations pending deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailedDeletionSet {
    entries: BTreeSet<PathBuf>,
}

impl FailedDeletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the record at `record`. A missing file is an empty set.
    pub fn load(record: &Path) -> CacheResult<Self> {
        let text = match fs::read_to_string(record) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(CacheError::metadata_io(e, record)),
        };
        Self::parse(&text).map_err(|e| CacheError::metadata_io(e, record))
    }

    fn parse(text: &str) -> io::Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(header) if header == HEADER => {}
            Some(other) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported deletion record header '{other}'"),
                ));
            }
            None => return Ok(Self::new()),
        }
        let entries = lines
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect();
        Ok(Self { entries })
    }

    /// Write the record to `record`, or delete it if the set is empty.
    ///
    /// The record is written to a sibling file and renamed into place so a
    /// crash never leaves a truncated record behind.
    pub fn save(&self, record: &Path) -> CacheResult<()> {
        if self.entries.is_empty() {
            return match fs::remove_file(record) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CacheError::metadata_io(e, record)),
            };
        }

        let mut scratch = record.as_os_str().to_owned();
        scratch.push(".new");
        let scratch = PathBuf::from(scratch);
        let written = (|| {
            let mut file = fs::File::create(&scratch)?;
            writeln!(file, "{HEADER}")?;
            for entry in &self.entries {
                let line = entry.to_str().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "non UTF-8 path in deletion record")
                })?;
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
            fs::rename(&scratch, record)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&scratch);
            return Err(CacheError::metadata_io(e, record));
        }
        Ok(())
    }

    /// Record a failed deletion. Returns `true` if the set changed.
    pub fn insert(&mut self, location: PathBuf) -> bool {
        self.entries.insert(location)
    }

    /// Forget a location after a successful deletion. Returns `true` if the
    /// set changed.
    pub fn remove(&mut self, location: &Path) -> bool {
        self.entries.remove(location)
    }

    /// Keep only the locations matching `keep`, returning the ones removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) -> Vec<PathBuf> {
        let (kept, removed): (BTreeSet<PathBuf>, BTreeSet<PathBuf>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|location| keep(location));
        self.entries = kept;
        removed.into_iter().collect()
    }

    pub fn contains(&self, location: &Path) -> bool {
        self.entries.contains(location)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_record_is_empty() {
        let dir = TempDir::new().unwrap();
        let set = FailedDeletionSet::load(&dir.path().join("record")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("record");

        let mut set = FailedDeletionSet::new();
        assert!(set.insert(PathBuf::from("/cache/a")));
        assert!(set.insert(PathBuf::from("/cache/b/c")));
        assert!(!set.insert(PathBuf::from("/cache/a")));
        set.save(&record).unwrap();

        let text = fs::read_to_string(&record).unwrap();
        assert!(text.starts_with(HEADER));

        let loaded = FailedDeletionSet::load(&record).unwrap();
        assert_eq!(loaded, set);
        assert!(loaded.contains(Path::new("/cache/b/c")));
        assert!(!dir.path().join("record.new").exists());
    }

    #[test]
    fn test_empty_set_removes_record() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("record");

        let mut set = FailedDeletionSet::new();
        set.insert(PathBuf::from("/cache/a"));
        set.save(&record).unwrap();
        assert!(record.exists());

        assert!(set.remove(Path::new("/cache/a")));
        set.save(&record).unwrap();
        assert!(!record.exists());

        // Saving an empty set with no record on disk is fine too
        set.save(&record).unwrap();
    }

    #[test]
    fn test_unknown_version_is_metadata_error() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("record");
        fs::write(&record, "mirrorfs-failed-deletions v9\n/cache/a\n").unwrap();

        let err = FailedDeletionSet::load(&record).unwrap_err();
        assert!(matches!(err, CacheError::MetadataIo { .. }), "{err:?}");
    }

    #[test]
    fn test_blank_lines_ignored() {
        let set = FailedDeletionSet::parse(&format!("{HEADER}\n\n/cache/a\n\n")).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next(), Some(Path::new("/cache/a")));
    }
}
