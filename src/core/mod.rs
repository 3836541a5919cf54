//! Core block abstractions and types
//!
//! This module defines the block payload traits, the flags and values blocks
//! carry, the type registry that materializes them, and the tree arena that
//! organises them into libraries.

pub mod block;
pub mod flags;
pub mod observer;
pub mod property;
pub mod registry;
pub mod tree;
pub mod value;

pub use block::{Block, BlockId, BlockType, Library, Ownership};
pub use flags::BlockFlags;
pub use observer::{ObserverId, TreeEvent, TreeObserver};
pub use property::{PropertyDescriptor, PropertyError};
pub use registry::{BlockExtension, BlockRegistry, MetaBlock, RegistryError};
pub use tree::{BlockTree, TreeError};
pub use value::{Value, ValueKind};
