//! Hierarchical, segment-addressed cache paths.
//!
//! A [`CachePath`] is the logical address of a cache entry. It maps 1:1 onto
//! the physical layout below the cache root: every segment becomes one path
//! component, so `/a/b` is stored at `<root>/a/b`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CacheError, CacheResult};

/// A logical cache path made of validated segments.
///
/// The empty path addresses the cache root. Segments are never empty and
/// never contain separators, so a path can always be joined onto a physical
/// root without escaping it.
///
/// # Example
///
/// ```
/// use mirrorfs_core::CachePath;
///
/// let path: CachePath = "/projects/site/index.html".parse().unwrap();
/// assert_eq!(path.segments(), ["projects", "site", "index.html"]);
/// assert_eq!(path.name(), Some("index.html"));
/// assert_eq!(path.parent().unwrap().to_string(), "/projects/site");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CachePath {
    segments: Vec<String>,
}

impl CachePath {
    /// The cache root (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from individual segments, validating each one.
    pub fn from_segments<I, S>(segments: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            validate_segment(segment).map_err(|reason| CacheError::InvalidPath {
                path: segments.join("/"),
                reason,
            })?;
        }
        Ok(Self { segments })
    }

    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append a single child segment.
    pub fn child(&self, name: &str) -> CacheResult<Self> {
        validate_segment(name).map_err(|reason| CacheError::InvalidPath {
            path: format!("{self}/{name}"),
            reason,
        })?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Whether `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &CachePath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Physical location of this path below `root`.
    pub fn to_physical(&self, root: &Path) -> PathBuf {
        let mut physical = root.to_path_buf();
        physical.extend(&self.segments);
        physical
    }
}

fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("empty segment".to_string());
    }
    if segment == "." || segment == ".." {
        return Err(format!("relative segment '{segment}' is not allowed"));
    }
    if let Some(c) = segment.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(format!("segment '{segment}' contains reserved character {c:?}"));
    }
    Ok(())
}

impl FromStr for CachePath {
    type Err = CacheError;

    /// Parse a `/`-separated path. Leading, trailing and repeated slashes
    /// are ignored, so `"/a/b"`, `"a/b/"` and `"a//b"` are equal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = s.split('/').filter(|segment| !segment.is_empty());
        Self::from_segments(segments).map_err(|e| match e {
            CacheError::InvalidPath { reason, .. } => CacheError::InvalidPath {
                path: s.to_string(),
                reason,
            },
            other => other,
        })
    }
}

impl fmt::Display for CachePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}
