//! Process exit codes.

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
/// Bad arguments, invalid cache paths or configuration.
pub const USAGE: u8 = 2;
/// The requested cache entry does not exist.
pub const NOT_FOUND: u8 = 3;
/// A sync pass finished but some resources failed.
pub const PARTIAL_SYNC: u8 = 4;
