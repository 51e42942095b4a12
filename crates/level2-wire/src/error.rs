//! Error types for wire-format parsing.

use thiserror::Error;

/// Result type alias using WireError.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while parsing Level II records. All of these map to a
/// `BadData` skip at the transport layer; none are fatal on their own.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Truncated record: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        needed: usize,
        offset: usize,
        available: usize,
    },

    #[error("Not a volume title record: {0}")]
    BadTitle(String),

    #[error("Invalid message header: {0}")]
    BadHeader(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),
}
