//! Binary serialization of block trees
//!
//! A stream is a [`FileHeader`], an opaque metadata blob of the size the
//! header declares, and the output of one codec walk. [`Dumper`] writes
//! streams, [`Loader`] reads them back and picks the codec matching the
//! header's format version.

pub mod dumper;
pub mod header;
pub mod kore_v1;
pub mod loader;
pub mod progress;

pub use dumper::Dumper;
pub use header::{FileHeader, NodeHeader, StreamVersion, KORE_SIGNATURE};
pub use kore_v1::{BlockDeflater, BlockInflater, CodecError, DeflateStatus, InflateStatus, KoreV1};
pub use loader::Loader;
pub use progress::{CancellationToken, ProgressCallback};

use std::io;

use crate::config::ConfigError;

/// Stream framing errors
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream does not start with the expected signature
    #[error("Invalid stream signature {0:#010x}")]
    InvalidSignature(u32),

    /// No codec handles this format version
    #[error("Unsupported stream format version {0}")]
    UnsupportedVersion(u32),

    /// The stream encodes values with an unknown layout
    #[error("Unsupported value encoding version {0}")]
    UnsupportedEncoding(u32),

    /// The metadata blob does not fit in the header field
    #[error("Metadata blob of {0} bytes is too large")]
    MetadataTooLarge(usize),

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
