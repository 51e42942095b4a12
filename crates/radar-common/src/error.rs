//! Error types for the radar-relay pipeline.

use thiserror::Error;

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;

/// Fatal pipeline conditions. Recoverable conditions travel as
/// [`TransportStatus`](crate::TransportStatus) values, never as errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Input stream unusable at stage '{stage}': {reason}")]
    BadInputStream { stage: String, reason: String },

    #[error("Output queue write failed: {0}")]
    BadOutputStream(String),

    #[error("Cannot decode radar message: {0}")]
    Decode(String),

    #[error("Cannot open input device: {0}")]
    DeviceOpen(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    pub fn bad_input(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadInputStream {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}
