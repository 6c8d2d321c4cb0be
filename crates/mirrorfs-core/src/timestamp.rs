//! Millisecond timestamps for cache entries.
//!
//! Entry timestamps are `i64` milliseconds since the Unix epoch and are
//! stored as the modification time of the committed cache file.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filetime::FileTime;

/// Sentinel returned by timestamp getters when no entry exists.
pub const NO_TIMESTAMP: i64 = -1;

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    system_time_to_millis(SystemTime::now())
}

pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => {
            let before = before.duration();
            // Round towards negative infinity so sub-millisecond pre-epoch
            // times do not collapse onto the epoch.
            let millis = i64::try_from(before.as_millis()).unwrap_or(i64::MAX);
            if before.subsec_nanos() % 1_000_000 == 0 {
                -millis
            } else {
                -millis - 1
            }
        }
    }
}

pub fn millis_to_system_time(millis: i64) -> SystemTime {
    if millis >= 0 {
        UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}

pub fn millis_to_file_time(millis: i64) -> FileTime {
    let secs = millis.div_euclid(1000);
    let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
    FileTime::from_unix_time(secs, nanos)
}

pub fn file_time_to_millis(time: FileTime) -> i64 {
    time.unix_seconds() * 1000 + i64::from(time.nanoseconds() / 1_000_000)
}

/// Modification time of `metadata` in milliseconds.
pub fn modified_millis(metadata: &Metadata) -> i64 {
    file_time_to_millis(FileTime::from_last_modification_time(metadata))
}

/// Set the modification time of the file at `path`.
pub fn set_modified_millis(path: &Path, millis: i64) -> io::Result<()> {
    filetime::set_file_mtime(path, millis_to_file_time(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_time_round_trip() {
        for millis in [0, 1, 999, 1_000, 1_700_000_000_123, -1, -999, -1_001] {
            assert_eq!(file_time_to_millis(millis_to_file_time(millis)), millis, "{millis}");
        }
    }

    #[test]
    fn test_system_time_round_trip() {
        for millis in [0, 42, 1_700_000_000_123, -5, -86_400_000] {
            assert_eq!(system_time_to_millis(millis_to_system_time(millis)), millis);
        }
    }

    #[test]
    fn test_set_and_read_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        set_modified_millis(&path, 1_234_567_890_123).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(modified_millis(&metadata), 1_234_567_890_123);
    }

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
