//! Client error types

/// Error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Chat stream ended without a final payload")]
    MissingFinalMessage,

    #[error("Stream transport failed: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("A response is already streaming for conversation {0}")]
    StreamInFlight(String),

    #[error("Prompt must not be empty")]
    EmptyPrompt,
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
