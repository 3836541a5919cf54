//! Kore Blocks - Reflective block trees and their binary serialization
//!
//! This crate provides a tree of typed blocks materialized through a type
//! registry, the observer protocol tracking its mutations, and the versioned
//! binary codec that writes and reads block subtrees.

pub mod config;
pub mod core;
pub mod serialization;
mod tests;

// Re-export commonly used types
pub use config::SerializationConfig;
pub use core::{Block, BlockFlags, BlockId, BlockRegistry, BlockTree, BlockType, Library, Value};
pub use serialization::{DeflateStatus, Dumper, InflateStatus, Loader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
