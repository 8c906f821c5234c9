//! Error types for mediaforge-probe

/// Errors that can occur while parsing codec parameter sets
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The bitstream ended before a mandatory field
    #[error("Bitstream truncated while reading {field} at bit {bit_offset}")]
    Truncated {
        field: &'static str,
        bit_offset: u64,
    },

    /// A parameter set required to describe the stream is absent
    #[error("Missing parameter set: {0}")]
    MissingParameterSet(&'static str),

    /// Invalid data encountered
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Syntax the parser does not handle
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ProbeError {
    /// Create an invalid data error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}

/// Result type for mediaforge-probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;
