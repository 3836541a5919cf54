//! Tree notifications
//!
//! Every structural mutation of a [`BlockTree`] is bracketed by a pair of
//! events: the "about to" event fires while the old state still holds, the
//! completion event fires once the new state (including child indexes) is in
//! place. Observers receive a shared reference to the tree so they can query
//! either state.

use super::block::BlockId;
use super::tree::BlockTree;

/// A tree notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A block is about to be inserted at `index`
    AddingBlock { library: BlockId, index: usize },
    /// A block was inserted at `index`
    BlockAdded { library: BlockId, index: usize },
    /// The block at `index` is about to be removed
    RemovingBlock { library: BlockId, index: usize },
    /// The block formerly at `index` was removed
    BlockRemoved { library: BlockId, index: usize },
    /// Two children are about to trade places
    SwappingBlocks { library: BlockId, first: usize, second: usize },
    /// Two children traded places
    BlocksSwapped { library: BlockId, first: usize, second: usize },
    /// A child is about to move from `from` to `to`
    MovingBlock { library: BlockId, from: usize, to: usize },
    /// A child moved from `from` to `to`
    BlockMoved { library: BlockId, from: usize, to: usize },
    /// All children of a library are about to be destroyed
    Clearing { library: BlockId },
    /// All children of a library were destroyed
    Cleared { library: BlockId },
    /// The position of a block in its library changed
    IndexChanged {
        block: BlockId,
        old: Option<usize>,
        new: Option<usize>,
    },
    /// A block became part of a tree
    Inserted { block: BlockId },
    /// A block left its tree
    Removed { block: BlockId },
    /// A block is being destroyed
    Deleted { block: BlockId },
    /// The display name of a block changed
    NameChanged { block: BlockId },
    /// The frozen state of a block changed
    FreezeChanged { block: BlockId, frozen: bool },
    /// Some user-visible attribute of a block changed
    Changed { block: BlockId },
}

/// Receives [`TreeEvent`]s from a [`BlockTree`].
pub trait TreeObserver: Send {
    fn on_event(&mut self, tree: &BlockTree, event: &TreeEvent);
}

impl<F> TreeObserver for F
where
    F: FnMut(&BlockTree, &TreeEvent) + Send,
{
    fn on_event(&mut self, tree: &BlockTree, event: &TreeEvent) {
        self(tree, event)
    }
}

/// Handle returned by [`BlockTree::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);
