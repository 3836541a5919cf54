//! Version 1 block codec
//!
//! A node is written as a [`NodeHeader`] followed by its properties payload,
//! a sequence of `(u32 property identifier, encoded value)` pairs, and then
//! by its serializable children, depth-first in library order.
//!
//! Deflating never touches non-serializable blocks: a block without the
//! `SERIALIZABLE` flag is skipped together with its whole subtree and is not
//! counted in its parent's `children_nb`.
//!
//! Inflating builds each node detached, fills its properties, then inflates
//! and attaches its children one by one. A node that fails or is canceled is
//! destroyed before the outcome is propagated, so nothing is left behind in
//! the tree.

use bytes::{Buf, BufMut, BytesMut};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

use crate::config::SerializationConfig;
use crate::core::block::BlockId;
use crate::core::flags::BlockFlags;
use crate::core::property::PropertyError;
use crate::core::registry::MetaBlock;
use crate::core::tree::{BlockTree, TreeError};
use crate::core::value::Value;

use super::header::NodeHeader;
use super::progress::ProgressCallback;

/// Outcome of a deflate walk that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeflateStatus {
    /// The block and its serializable subtree were written
    Success,
    /// The block is not serializable; nothing was written
    Skipped,
    /// The callback canceled the walk; the sink holds a truncated stream
    Canceled,
}

/// Outcome of an inflate walk that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateStatus {
    /// The detached root of the rebuilt subtree
    Success(BlockId),
    /// The callback canceled the walk; everything built so far was destroyed
    Canceled,
}

impl InflateStatus {
    /// Root of the rebuilt subtree, if the walk completed
    pub fn block(self) -> Option<BlockId> {
        match self {
            InflateStatus::Success(id) => Some(id),
            InflateStatus::Canceled => None,
        }
    }
}

/// Codec failures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No registered type has this identifier
    #[error("Unknown block type identifier {0:#010x}")]
    UnknownBlockType(u32),

    /// The block being written has no registry entry
    #[error("Block {0} has no registered type and cannot be serialized")]
    Unregistered(BlockId),

    /// The type declares no property with this identifier
    #[error("Unknown property identifier {property:#010x} for block type {type_name}")]
    UnknownProperty { type_name: &'static str, property: u32 },

    /// The decoded value could not be stored into the block
    #[error("Failed to write property {property} of {type_name}: {source}")]
    PropertyWrite {
        type_name: &'static str,
        property: &'static str,
        #[source]
        source: PropertyError,
    },

    #[error("Corrupt stream: {0}")]
    Corrupt(String),

    #[error("Blocks nested deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("Properties payload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u32 },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Stream source the inflater can measure
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Serializes a block subtree
pub trait BlockDeflater {
    /// Write `root` and its serializable subtree to `sink`.
    fn deflate(
        &mut self,
        sink: &mut dyn Write,
        tree: &BlockTree,
        root: BlockId,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<DeflateStatus, CodecError>;
}

/// Rebuilds a block subtree
pub trait BlockInflater {
    /// Read one node and its subtree from `source` into `tree`.
    ///
    /// On success the returned root is detached; the caller decides where it
    /// goes.
    fn inflate(
        &mut self,
        source: &mut dyn ReadSeek,
        tree: &mut BlockTree,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<InflateStatus, CodecError>;
}

/// Version 1 codec
#[derive(Debug)]
pub struct KoreV1 {
    config: SerializationConfig,
    staging: BytesMut,
}

impl Default for KoreV1 {
    fn default() -> Self {
        Self::new(SerializationConfig::default())
    }
}

impl KoreV1 {
    pub fn new(config: SerializationConfig) -> Self {
        let staging = BytesMut::with_capacity(config.staging_capacity);
        Self { config, staging }
    }

    pub fn config(&self) -> &SerializationConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Deflate
    // ------------------------------------------------------------------

    fn deflate_node(
        &mut self,
        sink: &mut dyn Write,
        tree: &BlockTree,
        id: BlockId,
        walk: &mut Walk<'_>,
        depth: usize,
    ) -> Result<DeflateStatus, CodecError> {
        if !walk.proceed() {
            debug!(block = %id, "Deflate canceled");
            return Ok(DeflateStatus::Canceled);
        }
        if !tree.contains(id) {
            return Err(TreeError::StaleBlock(id).into());
        }
        if !tree.check_flag(id, BlockFlags::SERIALIZABLE) {
            return Ok(DeflateStatus::Skipped);
        }
        if depth >= self.config.max_depth {
            warn!(block = %id, depth, "Deflate nesting limit reached");
            return Err(CodecError::DepthExceeded(self.config.max_depth));
        }

        let meta = tree.meta_block(id).ok_or(CodecError::Unregistered(id))?;
        let children: Vec<BlockId> = tree
            .children(id)
            .iter()
            .copied()
            .filter(|&child| tree.check_flag(child, BlockFlags::SERIALIZABLE))
            .collect();

        let properties_nb = self.stage_properties(tree, id, meta)?;
        let size = self.staging.len() as u64;
        if size > u64::from(self.config.max_payload_size) {
            warn!(block = %id, size, "Properties payload too large");
            return Err(CodecError::PayloadTooLarge {
                size,
                limit: self.config.max_payload_size,
            });
        }

        let header = NodeHeader {
            size: size as u32,
            block_type: meta.type_id(),
            properties_nb,
            children_nb: children.len() as u32,
        };
        header.write_to(sink)?;
        sink.write_all(&self.staging)?;

        walk.done += 1;
        walk.report(walk.done);
        debug!(
            block = %id,
            type_name = meta.name(),
            properties = properties_nb,
            children = header.children_nb,
            "Deflated block"
        );

        for child in children {
            match self.deflate_node(sink, tree, child, walk, depth + 1)? {
                DeflateStatus::Canceled => return Ok(DeflateStatus::Canceled),
                DeflateStatus::Success | DeflateStatus::Skipped => {}
            }
        }
        Ok(DeflateStatus::Success)
    }

    /// Fill the staging buffer with the stored properties of `id`.
    fn stage_properties(
        &mut self,
        tree: &BlockTree,
        id: BlockId,
        meta: &MetaBlock,
    ) -> Result<u32, CodecError> {
        let block = tree.block(id).ok_or(TreeError::StaleBlock(id))?;
        self.staging.clear();

        let mut count = 0u32;
        for (slot, property) in meta.properties().iter().enumerate() {
            if !property.is_stored() {
                continue;
            }
            let (Some(property_id), Some(value)) = (meta.property_id(slot), property.read(block)) else {
                continue;
            };
            self.staging.put_u32_le(property_id);
            value.encode(&mut self.staging);
            count += 1;
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Inflate
    // ------------------------------------------------------------------

    fn inflate_node(
        &mut self,
        source: &mut dyn ReadSeek,
        tree: &mut BlockTree,
        walk: &mut Walk<'_>,
        depth: usize,
    ) -> Result<InflateStatus, CodecError> {
        if !walk.proceed() {
            debug!(depth, "Inflate canceled");
            return Ok(InflateStatus::Canceled);
        }
        walk.report(source.stream_position()?);

        if depth >= self.config.max_depth {
            warn!(depth, "Inflate nesting limit reached");
            return Err(CodecError::DepthExceeded(self.config.max_depth));
        }

        let header = NodeHeader::read_from(source)?;
        if header.size > self.config.max_payload_size {
            warn!(size = header.size, "Properties payload too large");
            return Err(CodecError::PayloadTooLarge {
                size: u64::from(header.size),
                limit: self.config.max_payload_size,
            });
        }
        let meta = tree.registry().lookup_id(header.block_type).ok_or_else(|| {
            warn!(block_type = header.block_type, "No factory for block type");
            CodecError::UnknownBlockType(header.block_type)
        })?;

        let size = header.size as usize;
        let mut payload = Vec::with_capacity(size.min(self.config.staging_capacity));
        (&mut *source).take(u64::from(header.size)).read_to_end(&mut payload)?;
        if payload.len() != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ends inside a properties payload",
            )
            .into());
        }

        let id = tree.create_from_meta(&meta);
        let outcome = self.fill_node(source, tree, id, &meta, &header, &payload, walk, depth);
        match outcome {
            Ok(InflateStatus::Success(_)) => {
                debug!(
                    block = %id,
                    type_name = meta.name(),
                    children = header.children_nb,
                    "Inflated block"
                );
                Ok(InflateStatus::Success(id))
            }
            other => {
                discard(tree, id);
                other
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_node(
        &mut self,
        source: &mut dyn ReadSeek,
        tree: &mut BlockTree,
        id: BlockId,
        meta: &MetaBlock,
        header: &NodeHeader,
        payload: &[u8],
        walk: &mut Walk<'_>,
        depth: usize,
    ) -> Result<InflateStatus, CodecError> {
        let mut buf = payload;
        for _ in 0..header.properties_nb {
            if buf.remaining() < 4 {
                return Err(CodecError::Corrupt(format!(
                    "properties payload of {} ends before its {} pairs",
                    meta.name(),
                    header.properties_nb
                )));
            }
            let property_id = buf.get_u32_le();
            let slot = meta.property_slot(property_id).ok_or_else(|| {
                warn!(type_name = meta.name(), property_id, "Unknown property identifier");
                CodecError::UnknownProperty {
                    type_name: meta.name(),
                    property: property_id,
                }
            })?;
            let value = Value::decode(&mut buf).map_err(|err| CodecError::Corrupt(err.to_string()))?;

            let property = meta.properties().get(slot).ok_or_else(|| {
                CodecError::Corrupt(format!("missing property slot {slot} of {}", meta.name()))
            })?;
            let block = tree.block_mut(id).ok_or(TreeError::StaleBlock(id))?;
            property.write(block, value).map_err(|source| {
                warn!(type_name = meta.name(), property = property.name(), error = %source, "Failed to set property");
                CodecError::PropertyWrite {
                    type_name: meta.name(),
                    property: property.name(),
                    source,
                }
            })?;
        }
        if buf.has_remaining() {
            return Err(CodecError::Corrupt(format!(
                "{} trailing bytes after the properties of {}",
                buf.remaining(),
                meta.name()
            )));
        }

        if header.children_nb > 0 && !tree.is_library(id) {
            return Err(CodecError::Corrupt(format!(
                "{} is not a library but declares {} children",
                meta.name(),
                header.children_nb
            )));
        }
        for _ in 0..header.children_nb {
            match self.inflate_node(source, tree, walk, depth + 1)? {
                InflateStatus::Canceled => return Ok(InflateStatus::Canceled),
                InflateStatus::Success(child) => {
                    if let Err(err) = tree.add(id, child) {
                        warn!(library = %id, %child, error = %err, "Failed to attach inflated child");
                        discard(tree, child);
                        return Err(err.into());
                    }
                }
            }
        }
        Ok(InflateStatus::Success(id))
    }
}

impl BlockDeflater for KoreV1 {
    fn deflate(
        &mut self,
        sink: &mut dyn Write,
        tree: &BlockTree,
        root: BlockId,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<DeflateStatus, CodecError> {
        let mut walk = Walk {
            progress,
            done: 0,
            total: tree.total_size(root) as u64 + 1,
        };
        self.deflate_node(sink, tree, root, &mut walk, 0)
    }
}

impl BlockInflater for KoreV1 {
    fn inflate(
        &mut self,
        source: &mut dyn ReadSeek,
        tree: &mut BlockTree,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<InflateStatus, CodecError> {
        let start = source.stream_position()?;
        let total = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(start))?;

        let mut walk = Walk {
            progress,
            done: 0,
            total,
        };
        let status = self.inflate_node(source, tree, &mut walk, 0)?;
        if status.block().is_some() {
            walk.report(source.stream_position()?);
        }
        Ok(status)
    }
}

struct Walk<'a> {
    progress: Option<&'a mut dyn ProgressCallback>,
    done: u64,
    total: u64,
}

impl Walk<'_> {
    fn proceed(&mut self) -> bool {
        self.progress
            .as_deref_mut()
            .map_or(true, |progress| progress.continue_operation())
    }

    fn report(&mut self, done: u64) {
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.progress(done, self.total);
        }
    }
}

/// Destroy a node built by a walk that did not complete.
fn discard(tree: &mut BlockTree, id: BlockId) {
    if let Err(err) = tree.destroy(id) {
        warn!(block = %id, error = %err, "Failed to discard partially inflated block");
    }
}
