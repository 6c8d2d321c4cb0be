//! Content assertions for cache tests.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`, for comparing large payloads.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Assert that two byte slices are equal.
///
/// On failure, shows sizes and the first differing position rather than
/// dumping potentially huge byte arrays.
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8], context: &str) {
    assert!(
        actual.len() == expected.len(),
        "{context}: size mismatch - expected {} bytes, got {} bytes",
        expected.len(),
        actual.len()
    );

    if let Some((i, (a, e))) = actual
        .iter()
        .zip(expected)
        .enumerate()
        .find(|(_, (a, e))| a != e)
    {
        panic!("{context}: content mismatch at byte {i} - expected 0x{e:02x}, got 0x{a:02x}");
    }
}

/// Assert that the SHA-256 of `actual` matches `expected_hash`.
pub fn assert_hash_equal(actual: &[u8], expected_hash: &[u8; 32], context: &str) {
    let actual_hash = sha256(actual);
    assert!(
        &actual_hash == expected_hash,
        "{context}: hash mismatch\n  expected: {expected_hash:02x?}\n  got:      {actual_hash:02x?}\n  (data size: {} bytes)",
        actual.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"hello world");
        let expected: [u8; 32] = [
            0xb9, 0x4d, 0x27, 0xb9, 0x93, 0x4d, 0x3e, 0x08, 0xa5, 0x2e, 0x52, 0xd7, 0xda, 0x7d,
            0xab, 0xfa, 0xc4, 0x84, 0xef, 0xe3, 0x7a, 0x53, 0x80, 0xee, 0x90, 0x88, 0xf7, 0xac,
            0xe2, 0xef, 0xcd, 0xe9,
        ];
        assert_eq!(hash, expected);
    }

    #[test]
    #[should_panic(expected = "size mismatch")]
    fn test_assert_bytes_equal_size_mismatch() {
        assert_bytes_equal(&[1, 2], &[1, 2, 3], "test");
    }

    #[test]
    #[should_panic(expected = "content mismatch at byte 1")]
    fn test_assert_bytes_equal_content_mismatch() {
        assert_bytes_equal(&[1, 9, 3], &[1, 2, 3], "test");
    }

    #[test]
    fn test_assert_hash_equal_success() {
        let data = b"cache entry";
        assert_hash_equal(data, &sha256(data), "test");
    }
}
