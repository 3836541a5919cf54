//! Stream structures
//!
//! Fixed-size records of the stream format. Every field is a little-endian
//! `u32`.

use bytes::{Buf, BufMut};
use std::io::{self, Read, Write};

use crate::core::value::VALUE_ENCODING_VERSION;

/// Pack four ASCII characters into a little-endian tag.
pub const fn fourcc(tag: [u8; 4]) -> u32 {
    u32::from_le_bytes(tag)
}

/// Signature opening every stream: `K`, `O`, `R`, `E`.
pub const KORE_SIGNATURE: u32 = fourcc(*b"KORE");

/// Known stream format versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StreamVersion {
    V1 = 1,
}

impl StreamVersion {
    /// Version written by default
    pub const CURRENT: StreamVersion = StreamVersion::V1;

    /// Map a header field to a known version
    pub fn from_u32(version: u32) -> Option<Self> {
        match version {
            1 => Some(StreamVersion::V1),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Stream file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub signature: u32,
    pub format_version: u32,
    pub host_encoding_version: u32,
    pub sub_profile_signature: u32,
    pub sub_profile_version: u32,
    pub meta_data_size: u32,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            signature: KORE_SIGNATURE,
            format_version: StreamVersion::CURRENT.as_u32(),
            host_encoding_version: VALUE_ENCODING_VERSION,
            sub_profile_signature: 0,
            sub_profile_version: 0,
            meta_data_size: 0,
        }
    }
}

impl FileHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 24;

    /// Header of a stream tagged with a caller-defined sub-profile
    pub fn with_sub_profile(signature: u32, version: u32) -> Self {
        Self {
            sub_profile_signature: signature,
            sub_profile_version: version,
            ..Self::default()
        }
    }

    /// Whether the signature marks a stream of this format
    pub fn is_valid(&self) -> bool {
        self.signature == KORE_SIGNATURE
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.signature);
        buf.put_u32_le(self.format_version);
        buf.put_u32_le(self.host_encoding_version);
        buf.put_u32_le(self.sub_profile_signature);
        buf.put_u32_le(self.sub_profile_version);
        buf.put_u32_le(self.meta_data_size);
        out
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            signature: buf.get_u32_le(),
            format_version: buf.get_u32_le(),
            host_encoding_version: buf.get_u32_le(),
            sub_profile_signature: buf.get_u32_le(),
            sub_profile_version: buf.get_u32_le(),
            meta_data_size: buf.get_u32_le(),
        }
    }

    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.to_bytes())
    }

    pub fn read_from<R: Read + ?Sized>(source: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; Self::SIZE];
        source.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Per-node header preceding a node's properties payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeHeader {
    /// Byte length of the properties payload
    pub size: u32,
    /// Type identifier from the registry
    pub block_type: u32,
    /// Number of (identifier, value) pairs in the payload
    pub properties_nb: u32,
    /// Number of child nodes following the payload
    pub children_nb: u32,
}

impl NodeHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.size);
        buf.put_u32_le(self.block_type);
        buf.put_u32_le(self.properties_nb);
        buf.put_u32_le(self.children_nb);
        out
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            size: buf.get_u32_le(),
            block_type: buf.get_u32_le(),
            properties_nb: buf.get_u32_le(),
            children_nb: buf.get_u32_le(),
        }
    }

    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.to_bytes())
    }

    pub fn read_from<R: Read + ?Sized>(source: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; Self::SIZE];
        source.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }
}
