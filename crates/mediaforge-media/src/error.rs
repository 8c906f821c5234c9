//! Error types for mediaforge-media.

use mediaforge_probe::ProbeError;
use std::io;
use thiserror::Error;

/// Result type for mediaforge-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mediaforge-media operations.
///
/// Every variant except [`Error::InsufficientData`] is fatal for the parse
/// session that produced it.
#[derive(Debug, Error)]
pub enum Error {
    /// Not enough input is buffered yet. The read did not move the cursor;
    /// feed more bytes and retry.
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    /// Input ended in the middle of a structure.
    #[error("Unexpected end of input at offset {offset}: need {needed} more bytes")]
    UnexpectedEof { offset: u64, needed: usize },

    /// Variable-length integer with an all-zero leading byte.
    #[error("Malformed variable-length integer at offset {offset}")]
    MalformedVarint { offset: u64 },

    /// EBML element id missing from the element table.
    #[error("Unknown EBML element id {id:#x} at offset {offset}")]
    UnknownElementId { id: u64, offset: u64 },

    /// EBML element with the reserved "unknown size" value.
    #[error("EBML element {id:#x} at offset {offset} has unknown size")]
    UnknownSizeElement { id: u64, offset: u64 },

    /// Element size not valid for its type (e.g. a 9-byte uint).
    #[error("Invalid size {size} for EBML element {name}")]
    InvalidElementSize { name: &'static str, size: u64 },

    /// Children consumed more bytes than their parent declared.
    #[error("{container} overrun: children end at offset {offset}, container ends at {end}")]
    ContainerOverrun {
        container: String,
        offset: u64,
        end: u64,
    },

    /// A mandatory element or decoder configuration is absent.
    #[error("Missing required element: {0}")]
    MissingElement(&'static str),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in MP4 file.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Invalid MPEG transport stream.
    #[error("Invalid transport stream: {0}")]
    InvalidTs(String),

    /// Invalid RIFF/WAVE structure.
    #[error("Invalid WAVE file: {0}")]
    InvalidRiff(String),

    /// Unsupported feature or codec.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Movie header does not fit the reserved space.
    #[error("moov of {size} bytes does not fit the reserved {reserved} bytes")]
    HeaderOverflow { size: usize, reserved: usize },

    /// Codec parameter parsing failed.
    #[error("Codec error: {0}")]
    Codec(#[from] ProbeError),

    /// The sample consumer asked to stop.
    #[error("Sink error: {0}")]
    Sink(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an invalid transport stream error.
    pub fn invalid_ts(msg: impl Into<String>) -> Self {
        Self::InvalidTs(msg.into())
    }

    /// Create an invalid RIFF/WAVE error.
    pub fn invalid_riff(msg: impl Into<String>) -> Self {
        Self::InvalidRiff(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Whether this error only means "feed more bytes".
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}
