//! Error types for chatrelay

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatRelayError {
    #[error("Failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unknown wire format: {0}")]
    UnknownWireFormat(String),

    #[error("Invalid feedback type: {0}")]
    InvalidFeedbackType(u8),
}
