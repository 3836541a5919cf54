//! Stream writer

use serde::Serialize;
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, warn};

use crate::config::SerializationConfig;
use crate::core::block::BlockId;
use crate::core::tree::BlockTree;

use super::header::FileHeader;
use super::kore_v1::{BlockDeflater, DeflateStatus, KoreV1};
use super::progress::ProgressCallback;
use super::StreamError;

/// Writes a stream: header, metadata, then one or more deflated subtrees.
///
/// The header is written as soon as the dumper is created and written again
/// at the same offset by [`Dumper::finish`]. A dumper dropped without being
/// finished rewrites the header on a best-effort basis.
pub struct Dumper<W: Write + Seek> {
    sink: Option<W>,
    header: FileHeader,
    header_offset: u64,
    config: SerializationConfig,
}

impl<W: Write + Seek> Dumper<W> {
    /// Start a stream without metadata
    pub fn new(sink: W, config: SerializationConfig) -> Result<Self, StreamError> {
        Self::with_metadata(sink, config, &[])
    }

    /// Start a stream carrying an opaque metadata blob
    pub fn with_metadata(
        mut sink: W,
        config: SerializationConfig,
        metadata: &[u8],
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let meta_data_size =
            u32::try_from(metadata.len()).map_err(|_| StreamError::MetadataTooLarge(metadata.len()))?;

        let header = FileHeader {
            meta_data_size,
            ..FileHeader::with_sub_profile(config.sub_profile_signature, config.sub_profile_version)
        };
        let header_offset = sink.stream_position()?;
        header.write_to(&mut sink)?;
        sink.write_all(metadata)?;
        debug!(offset = header_offset, meta_data_size, "Stream header written");

        Ok(Self {
            sink: Some(sink),
            header,
            header_offset,
            config,
        })
    }

    /// Start a stream whose metadata blob is `metadata` as JSON
    pub fn with_json_metadata<T: Serialize>(
        sink: W,
        config: SerializationConfig,
        metadata: &T,
    ) -> Result<Self, StreamError> {
        let blob = serde_json::to_vec(metadata)?;
        Self::with_metadata(sink, config, &blob)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Codec matching the header's format version
    pub fn deflater(&self) -> Box<dyn BlockDeflater> {
        Box::new(KoreV1::new(self.config.clone()))
    }

    /// Deflate `root` and its serializable subtree into the stream
    pub fn dump(
        &mut self,
        tree: &BlockTree,
        root: BlockId,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<DeflateStatus, StreamError> {
        let mut deflater = self.deflater();
        let sink = self.sink_mut()?;
        let status = deflater.deflate(sink, tree, root, progress)?;
        Ok(status)
    }

    /// Rewrite the header, flush, and hand the sink back
    pub fn finish(mut self) -> Result<W, StreamError> {
        self.rewrite_header()?;
        self.sink.take().ok_or_else(finished)
    }

    fn sink_mut(&mut self) -> Result<&mut W, StreamError> {
        self.sink.as_mut().ok_or_else(finished)
    }

    fn rewrite_header(&mut self) -> Result<(), StreamError> {
        let header = self.header;
        let offset = self.header_offset;
        let sink = self.sink_mut()?;

        let end = sink.stream_position()?;
        sink.seek(SeekFrom::Start(offset))?;
        header.write_to(sink)?;
        sink.seek(SeekFrom::Start(end))?;
        sink.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for Dumper<W> {
    fn drop(&mut self) {
        if self.sink.is_some() {
            if let Err(err) = self.rewrite_header() {
                warn!(error = %err, "Failed to rewrite stream header");
            }
        }
    }
}

fn finished() -> StreamError {
    StreamError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "stream already finished",
    ))
}
