//! Requested direction of a synchronization pass.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which way content may flow. Supplied per call, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Remote to cache.
    Incoming,
    /// Cache to remote.
    Outgoing,
    /// Whichever side is newer wins.
    Both,
}

impl SyncDirection {
    /// Whether remote content may be pulled into the cache.
    #[inline]
    pub fn pulls(self) -> bool {
        matches!(self, Self::Incoming | Self::Both)
    }

    /// Whether cached content may be pushed to the remote.
    #[inline]
    pub fn pushes(self) -> bool {
        matches!(self, Self::Outgoing | Self::Both)
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "incoming" | "pull" => Ok(Self::Incoming),
            "outgoing" | "push" => Ok(Self::Outgoing),
            "both" | "refresh" => Ok(Self::Both),
            other => Err(format!(
                "unknown sync direction '{other}' (expected pull, push or both)"
            )),
        }
    }
}
