//! Shared utilities

pub mod checksum;

pub use checksum::{append_checksum, is_checksum_valid};
