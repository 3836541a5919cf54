//! Block flags
//!
//! Every node of a block tree carries a small bitset describing how the rest of
//! the system may treat it: whether it takes part in serialization, whether it
//! can be browsed or edited, and where it is in its lifecycle.

use bitflags::bitflags;

bitflags! {
    /// Flags a block can be marked with.
    ///
    /// Bits below [`BlockFlags::EXTENSION_WATERMARK`] are reserved for the
    /// framework. Block types define their own flags above it with
    /// [`BlockFlags::extension`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u32 {
        /// The block is being torn down.
        const IS_BEING_DELETED = 1 << 0;
        /// The block should be considered for serialization.
        const SERIALIZABLE = 1 << 1;
        /// The block is navigable from a user interface.
        const BROWSABLE = 1 << 2;
        /// Users can modify the block.
        const EDITABLE = 1 << 3;
        /// The block is owned by the system and cannot be removed by users.
        const SYSTEM_OWNED = 1 << 4;
        /// The block is part of the system itself (libraries, factories).
        const SYSTEM = 1 << 5;
        /// The block was allocated through its type registry entry.
        const ALLOCATED = 1 << 6;
    }
}

impl BlockFlags {
    /// First bit available to type-specific flags.
    pub const EXTENSION_WATERMARK: u32 = 7;

    /// Build the `n`-th type-specific extension flag.
    ///
    /// Returns `None` when `n` would not fit in the bitset.
    pub fn extension(n: u32) -> Option<Self> {
        let bit = Self::EXTENSION_WATERMARK.checked_add(n)?;
        if bit >= u32::BITS {
            return None;
        }
        Some(Self::from_bits_retain(1 << bit))
    }

    /// Whether any type-specific extension flag is set.
    pub fn has_extensions(self) -> bool {
        self.bits() >> Self::EXTENSION_WATERMARK != 0
    }
}
