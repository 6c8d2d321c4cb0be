//! Test payload generators.
//!
//! Concurrency tests need payloads whose origin can be read back from the
//! committed bytes: a torn or interleaved write must show up as a run that
//! does not belong to any single writer.

use rand::Rng;

/// Random bytes of the given size.
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}

/// `len` copies of `tag`. Useful for checking that concurrent writers never
/// interleave: every committed run must be a single tag.
pub fn tagged_run(tag: u8, len: usize) -> Vec<u8> {
    vec![tag; len]
}

/// A newline-terminated record naming its writer and sequence number,
/// e.g. `writer-3:0007\n`.
pub fn labelled_record(writer: usize, seq: usize) -> Vec<u8> {
    format!("writer-{writer}:{seq:04}\n").into_bytes()
}

/// All 256 byte values.
pub fn all_byte_values() -> Vec<u8> {
    (0u8..=255).collect()
}

/// Binary content with NULs, mixed newlines and high bytes, which breaks
/// anything that treats cache content as text.
pub fn problematic_binary() -> Vec<u8> {
    let mut data = Vec::with_capacity(512);
    data.extend_from_slice(&[0, 0, 0]);
    data.extend_from_slice(b"\n\r\n\r");
    data.extend(0u8..32);
    data.extend(128u8..=255);
    data.extend_from_slice(b"plain text");
    data.extend_from_slice(&[0, 0, 0]);
    data
}
