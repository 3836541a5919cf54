//! Block tree
//!
//! [`BlockTree`] is the arena owning every block of one or more trees. Nodes
//! are addressed by generation-checked [`BlockId`]s. A node whose payload is a
//! library type is also an ordered container of other nodes; the tree keeps
//! the parent link and the index of every child consistent with that order.
//!
//! Lifecycle of a block: created detached, attached by insertion into a
//! library, and destroyed through [`BlockTree::destroy`], which flags the block
//! as being deleted, tears down its subtree leaves first, detaches it and only
//! then hands it back to whoever owns it.

use std::sync::Arc;
use tracing::{debug, warn};

use super::block::{Block, BlockId, BlockType, Ownership};
use super::flags::BlockFlags;
use super::observer::{ObserverId, TreeEvent, TreeObserver};
use super::registry::{BlockRegistry, MetaBlock};

/// Tree errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The handle refers to a block that no longer exists
    #[error("Stale block handle: {0}")]
    StaleBlock(BlockId),

    /// The block is not a library
    #[error("Block {0} is not a library")]
    NotALibrary(BlockId),

    /// The block already has a parent
    #[error("Block {0} already belongs to a library")]
    AlreadyAttached(BlockId),

    /// The block is not a child of the library
    #[error("Block {block} is not a child of {library}")]
    NotAChild { library: BlockId, block: BlockId },

    /// Position outside of the library
    #[error("Index {index} out of bounds for library of size {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Inserting the block would make it its own ancestor
    #[error("Inserting {block} into {library} would create a cycle")]
    CycleDetected { library: BlockId, block: BlockId },

    /// The library does not accept the block
    #[error("Library {library} does not accept block {block}")]
    Rejected { library: BlockId, block: BlockId },

    /// The block is being destroyed
    #[error("Block {0} is being deleted")]
    BeingDeleted(BlockId),

    /// The block is neither registry-owned nor a system block
    #[error("Block {0} cannot be destroyed by the tree")]
    NotDestructible(BlockId),

    /// The block is owned by the tree and cannot be handed out
    #[error("Block {0} is owned by the tree")]
    NotReclaimable(BlockId),

    /// No registry entry for the type
    #[error("Block type not registered: {0}")]
    UnknownType(String),
}

struct Node {
    block: Box<dyn Block>,
    meta: Option<Arc<MetaBlock>>,
    ownership: Ownership,
    flags: BlockFlags,
    name: String,
    index: Option<usize>,
    parent: Option<BlockId>,
    children: Option<Vec<BlockId>>,
    frozen: bool,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of blocks organised as trees
pub struct BlockTree {
    registry: BlockRegistry,
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
    observers: Vec<(ObserverId, Box<dyn TreeObserver>)>,
    next_observer: u64,
}

impl BlockTree {
    /// Create an empty tree materializing blocks through `registry`
    pub fn new(registry: BlockRegistry) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// The registry this tree creates blocks with
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Number of blocks alive in the arena
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no block
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a detached default instance of `T` through its registry entry.
    pub fn create<T: BlockType>(&mut self) -> Result<BlockId, TreeError> {
        let meta = self
            .registry
            .lookup_name(T::TYPE_NAME)
            .ok_or_else(|| TreeError::UnknownType(T::TYPE_NAME.to_string()))?;
        Ok(self.create_from_meta(&meta))
    }

    /// Create a detached default instance of the type called `name`.
    ///
    /// Returns `None` if the type is unknown.
    pub fn create_by_name(&mut self, name: &str) -> Option<BlockId> {
        let meta = self.registry.lookup_name(name)?;
        Some(self.create_from_meta(&meta))
    }

    /// Create a detached default instance through `meta`.
    pub fn create_from_meta(&mut self, meta: &Arc<MetaBlock>) -> BlockId {
        let block = meta.create_block();
        let flags = meta.default_flags() | BlockFlags::ALLOCATED;
        self.alloc(block, Some(Arc::clone(meta)), Ownership::RegistryOwned, flags)
    }

    /// Hand a system block over to the tree, which drops it on destruction.
    pub fn insert_system(&mut self, block: Box<dyn Block>) -> BlockId {
        let meta = self.registry.lookup_name(block.type_name());
        self.alloc(block, meta, Ownership::StaticOwned, BlockFlags::SYSTEM)
    }

    /// Place a block managed elsewhere into the arena.
    ///
    /// Destroying it detaches it but keeps it in the arena until its owner
    /// takes it back with [`BlockTree::reclaim`].
    pub fn adopt(&mut self, block: Box<dyn Block>) -> BlockId {
        let meta = self.registry.lookup_name(block.type_name());
        self.alloc(block, meta, Ownership::Unowned, BlockFlags::empty())
    }

    /// Take an unowned, detached block back out of the arena.
    pub fn reclaim(&mut self, id: BlockId) -> Result<Box<dyn Block>, TreeError> {
        let node = self.node(id).ok_or(TreeError::StaleBlock(id))?;
        if node.ownership != Ownership::Unowned {
            return Err(TreeError::NotReclaimable(id));
        }
        if node.parent.is_some() {
            return Err(TreeError::AlreadyAttached(id));
        }
        if node.children.as_ref().is_some_and(|c| !c.is_empty()) {
            return Err(TreeError::NotReclaimable(id));
        }
        Ok(self.free_slot(id).block)
    }

    fn alloc(
        &mut self,
        block: Box<dyn Block>,
        meta: Option<Arc<MetaBlock>>,
        ownership: Ownership,
        flags: BlockFlags,
    ) -> BlockId {
        let children = block.is_library().then(Vec::new);
        let node = Node {
            block,
            meta,
            ownership,
            flags,
            name: String::new(),
            index: None,
            parent: None,
            children,
            frozen: false,
        };

        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                BlockId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                BlockId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn free_slot(&mut self, id: BlockId) -> Node {
        let slot = &mut self.slots[id.index as usize];
        let node = slot.node.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        match node {
            Some(node) => node,
            // Callers check the handle first.
            None => unreachable!("freeing empty slot {id}"),
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn node(&self, id: BlockId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: BlockId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn require(&self, id: BlockId) -> Result<&Node, TreeError> {
        self.node(id).ok_or(TreeError::StaleBlock(id))
    }

    fn require_library(&self, id: BlockId) -> Result<&Vec<BlockId>, TreeError> {
        self.require(id)?
            .children
            .as_ref()
            .ok_or(TreeError::NotALibrary(id))
    }

    /// Whether `id` refers to a live block
    pub fn contains(&self, id: BlockId) -> bool {
        self.node(id).is_some()
    }

    /// Payload of a block
    pub fn block(&self, id: BlockId) -> Option<&dyn Block> {
        self.node(id).map(|node| node.block.as_ref())
    }

    /// Mutable payload of a block
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut dyn Block> {
        match self.node_mut(id) {
            Some(node) => Some(node.block.as_mut()),
            None => None,
        }
    }

    /// Payload of a block as its concrete type
    pub fn get<T: Block>(&self, id: BlockId) -> Option<&T> {
        self.block(id)?.as_any().downcast_ref::<T>()
    }

    /// Mutable payload of a block as its concrete type
    pub fn get_mut<T: Block>(&mut self, id: BlockId) -> Option<&mut T> {
        self.block_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Registry entry of a block's type, if its type is registered
    pub fn meta_block(&self, id: BlockId) -> Option<&MetaBlock> {
        self.node(id)?.meta.as_deref()
    }

    /// Who reclaims the block on destruction
    pub fn ownership(&self, id: BlockId) -> Option<Ownership> {
        self.node(id).map(|node| node.ownership)
    }

    /// Flags of a block (empty for stale handles)
    pub fn flags(&self, id: BlockId) -> BlockFlags {
        self.node(id).map(|node| node.flags).unwrap_or_default()
    }

    /// Check a block for a flag
    pub fn check_flag(&self, id: BlockId, flag: BlockFlags) -> bool {
        self.flags(id).contains(flag)
    }

    /// Whether the block is being destroyed
    pub fn is_being_deleted(&self, id: BlockId) -> bool {
        self.check_flag(id, BlockFlags::IS_BEING_DELETED)
    }

    /// Whether the block is a library
    pub fn is_library(&self, id: BlockId) -> bool {
        self.node(id).is_some_and(|node| node.children.is_some())
    }

    /// Position of the block in its library, `None` when detached
    pub fn index(&self, id: BlockId) -> Option<usize> {
        self.node(id)?.index
    }

    /// Library containing the block
    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        self.node(id)?.parent
    }

    /// Whether the block belongs to a library
    pub fn has_parent(&self, id: BlockId) -> bool {
        self.parent(id).is_some()
    }

    /// Children of a library, in order (empty for leaves)
    pub fn children(&self, id: BlockId) -> &[BlockId] {
        self.node(id)
            .and_then(|node| node.children.as_deref())
            .unwrap_or(&[])
    }

    /// Child of a library at position `index`
    pub fn child_at(&self, library: BlockId, index: usize) -> Option<BlockId> {
        self.children(library).get(index).copied()
    }

    /// Number of direct children of a library
    pub fn size(&self, library: BlockId) -> usize {
        self.children(library).len()
    }

    /// Recursive number of descendants of a library
    pub fn total_size(&self, library: BlockId) -> usize {
        let mut stack = self.children(library).to_vec();
        let mut count = 0;
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend_from_slice(self.children(id));
        }
        count
    }

    /// `root` and all its descendants, depth-first pre-order
    pub fn descendants(&self, root: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        if self.contains(root) {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                out.push(id);
                stack.extend(self.children(id).iter().rev().copied());
            }
        }
        out
    }

    /// `root` and its descendants whose payload is a `T`
    ///
    /// `max_depth` bounds how many levels below `root` are searched; `None`
    /// searches the whole subtree.
    pub fn find_children<T: Block>(&self, root: BlockId, max_depth: Option<usize>) -> Vec<BlockId> {
        let mut out = Vec::new();
        self.collect_children::<T>(root, max_depth, &mut out);
        out
    }

    fn collect_children<T: Block>(&self, id: BlockId, depth: Option<usize>, out: &mut Vec<BlockId>) {
        if self.get::<T>(id).is_some() {
            out.push(id);
        }
        if depth == Some(0) {
            return;
        }
        let next = depth.map(|d| d - 1);
        for &child in self.children(id) {
            self.collect_children::<T>(child, next, out);
        }
    }

    /// Display name of a block
    pub fn block_name(&self, id: BlockId) -> Option<&str> {
        self.node(id).map(|node| node.name.as_str())
    }

    /// Human readable description of a block
    pub fn info_string(&self, id: BlockId) -> Option<String> {
        self.block(id).map(|block| block.info_string())
    }

    /// Whether the block is frozen
    pub fn is_frozen(&self, id: BlockId) -> bool {
        self.node(id).is_some_and(|node| node.frozen)
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Rename a block
    pub fn set_block_name(&mut self, id: BlockId, name: impl Into<String>) -> Result<(), TreeError> {
        let name = name.into();
        let node = self.node_mut(id).ok_or(TreeError::StaleBlock(id))?;
        if node.name == name {
            return Ok(());
        }
        node.name = name;
        self.notify(TreeEvent::NameChanged { block: id });
        self.notify(TreeEvent::Changed { block: id });
        Ok(())
    }

    /// Add a flag to a block
    pub fn add_flag(&mut self, id: BlockId, flag: BlockFlags) -> Result<(), TreeError> {
        let node = self.node_mut(id).ok_or(TreeError::StaleBlock(id))?;
        node.flags.insert(flag);
        Ok(())
    }

    /// Remove a flag from a block
    pub fn remove_flag(&mut self, id: BlockId, flag: BlockFlags) -> Result<(), TreeError> {
        let node = self.node_mut(id).ok_or(TreeError::StaleBlock(id))?;
        node.flags.remove(flag);
        Ok(())
    }

    /// Toggle whether a block takes part in serialization
    pub fn set_serializable(&mut self, id: BlockId, serializable: bool) -> Result<(), TreeError> {
        if serializable {
            self.add_flag(id, BlockFlags::SERIALIZABLE)
        } else {
            self.remove_flag(id, BlockFlags::SERIALIZABLE)
        }
    }

    /// Freeze or unfreeze a block; libraries propagate to their subtree
    pub fn freeze(&mut self, id: BlockId, frozen: bool) -> Result<(), TreeError> {
        let node = self.node_mut(id).ok_or(TreeError::StaleBlock(id))?;
        if node.frozen == frozen {
            return Ok(());
        }
        node.frozen = frozen;
        self.notify(TreeEvent::FreezeChanged { block: id, frozen });
        for child in self.children(id).to_vec() {
            self.freeze(child, frozen)?;
        }
        Ok(())
    }

    /// Run the optimization hook of every block of a subtree
    pub fn optimize_tree(&mut self, root: BlockId) {
        for id in self.descendants(root) {
            if let Some(node) = self.node_mut(id) {
                node.block.optimize();
                if let Some(children) = node.children.as_mut() {
                    children.shrink_to_fit();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register an observer of this tree's events
    pub fn subscribe(&mut self, observer: impl TreeObserver + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer; returns whether it was registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer, _)| *observer != id);
        self.observers.len() != before
    }

    fn notify(&mut self, event: TreeEvent) {
        if self.observers.is_empty() {
            return;
        }
        let mut observers = std::mem::take(&mut self.observers);
        for (_, observer) in observers.iter_mut() {
            observer.on_event(self, &event);
        }
        self.observers = observers;
    }

    fn notify_subtree(&mut self, root: BlockId, event: fn(BlockId) -> TreeEvent) {
        if self.observers.is_empty() {
            return;
        }
        for id in self.descendants(root) {
            self.notify(event(id));
        }
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    /// Append a detached block to a library
    pub fn add(&mut self, library: BlockId, block: BlockId) -> Result<(), TreeError> {
        let index = self.require_library(library)?.len();
        self.insert(library, block, index)
    }

    /// Insert a detached block into a library at `index`
    pub fn insert(&mut self, library: BlockId, block: BlockId, index: usize) -> Result<(), TreeError> {
        self.check_insertion(library, block, index)?;

        self.notify(TreeEvent::AddingBlock { library, index });
        if let Some(children) = self.node_mut(library).and_then(|n| n.children.as_mut()) {
            children.insert(index, block);
        }
        if let Some(node) = self.node_mut(block) {
            node.parent = Some(library);
        }
        self.reindex(library, index);
        self.notify_subtree(block, |block| TreeEvent::Inserted { block });
        self.notify(TreeEvent::BlockAdded { library, index });
        Ok(())
    }

    fn check_insertion(&self, library: BlockId, block: BlockId, index: usize) -> Result<(), TreeError> {
        let len = self.require_library(library)?.len();
        let node = self.require(block)?;

        if node.parent.is_some() {
            return Err(TreeError::AlreadyAttached(block));
        }
        debug_assert!(node.index.is_none(), "detached block {block} has an index");
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        self.check_compatible(library, block)
    }

    fn check_compatible(&self, library: BlockId, block: BlockId) -> Result<(), TreeError> {
        let lib_node = self.require(library)?;
        let node = self.require(block)?;

        if lib_node.flags.contains(BlockFlags::IS_BEING_DELETED) {
            return Err(TreeError::BeingDeleted(library));
        }
        if node.flags.contains(BlockFlags::IS_BEING_DELETED) {
            return Err(TreeError::BeingDeleted(block));
        }
        let mut ancestor = Some(library);
        while let Some(current) = ancestor {
            if current == block {
                return Err(TreeError::CycleDetected { library, block });
            }
            ancestor = self.parent(current);
        }
        if !lib_node.block.accepts_block(node.block.as_ref()) {
            return Err(TreeError::Rejected { library, block });
        }
        Ok(())
    }

    /// Remove a child from its library, leaving it detached
    pub fn remove(&mut self, library: BlockId, block: BlockId) -> Result<(), TreeError> {
        let index = self
            .require_library(library)?
            .iter()
            .position(|&child| child == block)
            .ok_or(TreeError::NotAChild { library, block })?;
        debug_assert_eq!(self.index(block), Some(index));

        self.notify(TreeEvent::RemovingBlock { library, index });
        if let Some(children) = self.node_mut(library).and_then(|n| n.children.as_mut()) {
            children.remove(index);
        }
        self.reindex(library, index);
        self.set_index(block, None);
        if let Some(node) = self.node_mut(block) {
            node.parent = None;
        }
        self.notify_subtree(block, |block| TreeEvent::Removed { block });
        self.notify(TreeEvent::BlockRemoved { library, index });
        Ok(())
    }

    /// Detach a block from its library, if it has one
    pub fn detach(&mut self, block: BlockId) -> Result<(), TreeError> {
        match self.require(block)?.parent {
            Some(library) => self.remove(library, block),
            None => Ok(()),
        }
    }

    /// Move a block, attached or not, to the end of another library
    pub fn reparent(&mut self, block: BlockId, library: BlockId) -> Result<(), TreeError> {
        let mut end = self.require_library(library)?.len();
        if self.parent(block) == Some(library) {
            end -= 1;
        }
        self.reparent_at(block, library, end)
    }

    /// Move a block, attached or not, to position `index` of another library
    ///
    /// The move is an explicit removal followed by an insertion; it is
    /// validated against the target first so a failed move leaves the block
    /// where it was.
    pub fn reparent_at(&mut self, block: BlockId, library: BlockId, index: usize) -> Result<(), TreeError> {
        let previous = self.require(block)?.parent;
        let len = self.require_library(library)?.len();
        let len = if previous == Some(library) { len - 1 } else { len };
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        self.check_compatible(library, block)?;

        if let Some(old) = previous {
            self.remove(old, block)?;
        }
        self.insert(library, block, index)
    }

    /// Swap the positions of two children of a library
    pub fn swap(&mut self, library: BlockId, a: BlockId, b: BlockId) -> Result<(), TreeError> {
        let children = self.require_library(library)?;
        let first = children
            .iter()
            .position(|&child| child == a)
            .ok_or(TreeError::NotAChild { library, block: a })?;
        let second = children
            .iter()
            .position(|&child| child == b)
            .ok_or(TreeError::NotAChild { library, block: b })?;

        self.notify(TreeEvent::SwappingBlocks { library, first, second });
        if let Some(children) = self.node_mut(library).and_then(|n| n.children.as_mut()) {
            children.swap(first, second);
        }
        self.set_index(a, Some(second));
        self.set_index(b, Some(first));
        self.notify(TreeEvent::BlocksSwapped { library, first, second });
        Ok(())
    }

    /// Move a child of a library to position `to`
    pub fn move_block(&mut self, library: BlockId, block: BlockId, to: usize) -> Result<(), TreeError> {
        let children = self.require_library(library)?;
        let len = children.len();
        let from = children
            .iter()
            .position(|&child| child == block)
            .ok_or(TreeError::NotAChild { library, block })?;
        if to >= len {
            return Err(TreeError::IndexOutOfBounds { index: to, len });
        }
        if from == to {
            return Ok(());
        }

        self.notify(TreeEvent::MovingBlock { library, from, to });
        if let Some(children) = self.node_mut(library).and_then(|n| n.children.as_mut()) {
            let moved = children.remove(from);
            children.insert(to, moved);
        }
        self.reindex(library, from.min(to));
        self.notify(TreeEvent::BlockMoved { library, from, to });
        Ok(())
    }

    fn set_index(&mut self, block: BlockId, index: Option<usize>) {
        let Some(node) = self.node_mut(block) else {
            return;
        };
        let old = node.index;
        if old != index {
            node.index = index;
            self.notify(TreeEvent::IndexChanged {
                block,
                old,
                new: index,
            });
        }
    }

    fn reindex(&mut self, library: BlockId, start: usize) {
        let children: Vec<BlockId> = self.children(library).iter().skip(start).copied().collect();
        for (offset, child) in children.into_iter().enumerate() {
            self.set_index(child, Some(start + offset));
        }
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Destroy every child of a library
    pub fn clear(&mut self, library: BlockId) -> Result<(), TreeError> {
        if self.require_library(library)?.is_empty() {
            return Ok(());
        }

        self.notify(TreeEvent::Clearing { library });
        for child in self.children(library).to_vec() {
            if let Err(err) = self.destroy(child) {
                warn!(%child, error = %err, "Child block could not be destroyed while clearing");
            }
        }
        if let Some(children) = self.node_mut(library).and_then(|n| n.children.as_mut()) {
            children.clear();
        }
        self.notify(TreeEvent::Cleared { library });
        Ok(())
    }

    /// Destroy a block and its subtree.
    ///
    /// The block is flagged as being deleted and announced, its children are
    /// destroyed depth-first, it is detached from its library and finally
    /// reclaimed by its owner. Unowned blocks go through every step but the
    /// last and are reported as [`TreeError::NotDestructible`].
    pub fn destroy(&mut self, id: BlockId) -> Result<(), TreeError> {
        self.require(id)?;

        if let Some(node) = self.node_mut(id) {
            node.flags.insert(BlockFlags::IS_BEING_DELETED);
        }
        self.notify(TreeEvent::Deleted { block: id });

        if self.is_library(id) {
            self.clear(id)?;
        }

        if let Some(library) = self.parent(id) {
            if self.is_being_deleted(library) {
                // The library tears its child list down itself.
                self.notify(TreeEvent::Removed { block: id });
                self.set_index(id, None);
                if let Some(node) = self.node_mut(id) {
                    node.parent = None;
                }
            } else {
                self.remove(library, id)?;
            }
        }

        self.reclaim_destroyed(id)
    }

    fn reclaim_destroyed(&mut self, id: BlockId) -> Result<(), TreeError> {
        let ownership = self.require(id)?.ownership;
        if ownership == Ownership::Unowned {
            warn!(block = %id, "Unowned block detached but not destroyed");
            return Err(TreeError::NotDestructible(id));
        }

        let node = self.free_slot(id);
        debug_assert!(node.parent.is_none(), "destroyed block {id} still has a parent");
        debug_assert!(node.flags.contains(BlockFlags::IS_BEING_DELETED));

        match (ownership, node.meta) {
            (Ownership::RegistryOwned, Some(meta)) => meta.release_block(node.block),
            _ => drop(node.block),
        }
        debug!(block = %id, "Destroyed block");
        Ok(())
    }
}

impl Drop for BlockTree {
    fn drop(&mut self) {
        // Keep live-instance counters accurate for blocks never destroyed.
        for slot in self.slots.iter_mut() {
            if let Some(node) = slot.node.take() {
                if let (Ownership::RegistryOwned, Some(meta)) = (node.ownership, node.meta) {
                    meta.release_block(node.block);
                }
            }
        }
    }
}

impl std::fmt::Debug for BlockTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTree")
            .field("len", &self.len)
            .field("observers", &self.observers.len())
            .finish()
    }
}
