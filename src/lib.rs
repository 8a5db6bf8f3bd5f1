//! treesums library crate
//!
//! Maintains a manifest of SHA-1 content hashes for every regular file below
//! a directory, re-hashing only files whose modification time changed, and
//! compares two manifests by content. Both CLI binaries are thin wrappers
//! around this API.

pub mod cli;
pub mod config;
pub mod diff;
pub mod hash;
pub mod manifest;
pub mod output;
pub mod scan_events;
pub mod scanner;
pub mod update;
pub mod walk;
