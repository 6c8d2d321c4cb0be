pub mod cat;
pub mod ls;
pub mod pending;
pub mod put;
pub mod rm;
pub mod stat;
pub mod stats;
pub mod sync;
pub mod touch;
