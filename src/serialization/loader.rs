//! Stream reader

use serde::de::DeserializeOwned;
use std::io::{self, Read, Seek};
use tracing::{debug, warn};

use crate::config::SerializationConfig;
use crate::core::tree::BlockTree;
use crate::core::value::VALUE_ENCODING_VERSION;

use super::header::{FileHeader, StreamVersion};
use super::kore_v1::{BlockInflater, InflateStatus, KoreV1};
use super::progress::ProgressCallback;
use super::StreamError;

/// Reads a stream written by a [`Dumper`](super::Dumper).
///
/// The header is read on construction. A stream with a wrong signature can
/// still be opened so callers can inspect it; [`Loader::load`] refuses it.
pub struct Loader<R: Read + Seek> {
    source: R,
    header: FileHeader,
    metadata: Vec<u8>,
    config: SerializationConfig,
}

impl<R: Read + Seek> Loader<R> {
    /// Read the header and, for a valid stream, the metadata blob
    pub fn new(mut source: R, config: SerializationConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let header = FileHeader::read_from(&mut source)?;

        let mut metadata = Vec::new();
        if header.is_valid() {
            let expected = u64::from(header.meta_data_size);
            (&mut source).take(expected).read_to_end(&mut metadata)?;
            if metadata.len() as u64 != expected {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ends inside its metadata blob",
                )
                .into());
            }
        } else {
            warn!(signature = header.signature, "Stream signature mismatch");
        }
        debug!(
            format_version = header.format_version,
            meta_data_size = header.meta_data_size,
            "Stream header read"
        );

        Ok(Self {
            source,
            header,
            metadata,
            config,
        })
    }

    /// Whether the stream carries the expected signature
    pub fn is_valid(&self) -> bool {
        self.header.is_valid()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Raw metadata blob
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// Metadata blob parsed as JSON
    pub fn metadata_json<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        Ok(serde_json::from_slice(&self.metadata)?)
    }

    /// Codec for the header's format version, `None` if no codec handles it
    pub fn inflater(&self) -> Option<Box<dyn BlockInflater>> {
        match StreamVersion::from_u32(self.header.format_version)? {
            StreamVersion::V1 => Some(Box::new(KoreV1::new(self.config.clone()))),
        }
    }

    /// Inflate the root node of the stream into `tree`
    pub fn load(
        &mut self,
        tree: &mut BlockTree,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<InflateStatus, StreamError> {
        if !self.is_valid() {
            return Err(StreamError::InvalidSignature(self.header.signature));
        }
        let mut inflater = self
            .inflater()
            .ok_or(StreamError::UnsupportedVersion(self.header.format_version))?;
        if self.header.host_encoding_version != VALUE_ENCODING_VERSION {
            return Err(StreamError::UnsupportedEncoding(self.header.host_encoding_version));
        }
        Ok(inflater.inflate(&mut self.source, tree, progress)?)
    }

    /// Hand the source back
    pub fn into_inner(self) -> R {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(header: FileHeader, metadata: &[u8]) -> Cursor<Vec<u8>> {
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(metadata);
        Cursor::new(bytes)
    }

    #[test]
    fn test_reads_header_and_metadata() {
        let header = FileHeader {
            meta_data_size: 2,
            ..FileHeader::with_sub_profile(9, 1)
        };
        let loader = Loader::new(stream(header, b"{}"), SerializationConfig::default()).unwrap();
        assert!(loader.is_valid());
        assert_eq!(loader.header(), &header);
        assert_eq!(loader.metadata(), b"{}");
        assert!(loader.inflater().is_some());
    }

    #[test]
    fn test_bad_signature_is_not_valid() {
        let header = FileHeader {
            signature: u32::from_le_bytes(*b"NOPE"),
            ..FileHeader::default()
        };
        let mut loader = Loader::new(stream(header, &[]), SerializationConfig::default()).unwrap();
        assert!(!loader.is_valid());

        let mut tree = BlockTree::new(crate::core::BlockRegistry::with_builtins().unwrap());
        let result = loader.load(&mut tree, None);
        assert!(matches!(result, Err(StreamError::InvalidSignature(_))));
    }

    #[test]
    fn test_unknown_version_has_no_inflater() {
        let header = FileHeader {
            format_version: 99,
            ..FileHeader::default()
        };
        let mut loader = Loader::new(stream(header, &[]), SerializationConfig::default()).unwrap();
        assert!(loader.is_valid());
        assert!(loader.inflater().is_none());

        let mut tree = BlockTree::new(crate::core::BlockRegistry::with_builtins().unwrap());
        let result = loader.load(&mut tree, None);
        assert!(matches!(result, Err(StreamError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_unknown_version_reported_before_encoding() {
        let header = FileHeader {
            format_version: 42,
            host_encoding_version: 7,
            ..FileHeader::default()
        };
        let mut loader = Loader::new(stream(header, &[]), SerializationConfig::default()).unwrap();
        let mut tree = BlockTree::new(crate::core::BlockRegistry::with_builtins().unwrap());
        let result = loader.load(&mut tree, None);
        assert!(matches!(result, Err(StreamError::UnsupportedVersion(42))));
    }

    #[test]
    fn test_truncated_metadata() {
        let header = FileHeader {
            meta_data_size: 10,
            ..FileHeader::default()
        };
        let result = Loader::new(stream(header, b"abc"), SerializationConfig::default());
        assert!(matches!(result, Err(StreamError::Io(_))));
    }
}
