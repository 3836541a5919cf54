//! Block trait and related types
//!
//! A block is the unit of composition of a block tree. The payload of a node
//! (its typed properties and behaviour) implements [`Block`]; the structural
//! state shared by every node (flags, index, parent, name) lives in the
//! [`BlockTree`](super::tree::BlockTree) arena next to it.

use std::any::Any;
use std::fmt;

use super::flags::BlockFlags;
use super::property::PropertyDescriptor;

/// Dynamic downcasting support for block payloads.
///
/// Implemented for every `'static` type, so block types never write it by hand.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Core block trait that all block payloads implement
pub trait Block: AsAny + Send + Sync + 'static {
    /// Registered type name of this block
    fn type_name(&self) -> &'static str;

    /// Whether nodes of this type are containers of other blocks
    fn is_library(&self) -> bool {
        false
    }

    /// Whether a library of this type accepts `child`.
    ///
    /// Only consulted for library types.
    fn accepts_block(&self, _child: &dyn Block) -> bool {
        true
    }

    /// Optimization hook.
    ///
    /// Called by [`BlockTree::optimize_tree`](super::tree::BlockTree::optimize_tree)
    /// on every node of a subtree.
    fn optimize(&mut self) {}

    /// Human readable description of the block
    fn info_string(&self) -> String {
        self.type_name().to_string()
    }

    /// Icon used by user interfaces
    fn icon_path(&self) -> &'static str {
        "kore/images/icons/block.png"
    }
}

/// Static description of a concrete block type.
///
/// This is what the [`BlockRegistry`](super::registry::BlockRegistry) consumes
/// to build the type's registry entry: a stable name, a default-constructible
/// payload and an ordered table of property descriptors.
pub trait BlockType: Block + Default {
    /// Stable type name, hashed into the wire type identifier
    const TYPE_NAME: &'static str;

    /// Property table, in declaration order
    fn properties() -> Vec<PropertyDescriptor> {
        Vec::new()
    }

    /// Flags set on freshly created instances
    fn default_flags() -> BlockFlags {
        BlockFlags::empty()
    }
}

/// Handle to a node of a [`BlockTree`](super::tree::BlockTree).
///
/// The handle is only meaningful for the lifetime of the tree that produced
/// it and is never persisted. Slots are reused after a block is destroyed; the
/// generation makes stale handles detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl BlockId {
    /// Process-local numeric identity of the block
    pub fn runtime_id(&self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Who reclaims a block when it is destroyed.
///
/// Decided once, when the block enters the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Created through a registry entry, which releases it and keeps its
    /// live-instance counter accurate
    RegistryOwned,
    /// System block owned by the tree itself, dropped directly
    StaticOwned,
    /// Managed elsewhere; destroying it detaches it but never frees it
    Unowned,
}

/// Basic data library: a block whose only role is to contain other blocks
#[derive(Debug, Clone, Default)]
pub struct Library;

impl Block for Library {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn is_library(&self) -> bool {
        true
    }

    fn info_string(&self) -> String {
        "Basic data library".to_string()
    }

    fn icon_path(&self) -> &'static str {
        "kore/images/icons/library.png"
    }
}

impl BlockType for Library {
    const TYPE_NAME: &'static str = "Library";

    fn default_flags() -> BlockFlags {
        BlockFlags::BROWSABLE
    }
}
