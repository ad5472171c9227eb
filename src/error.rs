//! Error types for courier

use thiserror::Error;

/// Main error type for transport operations.
///
/// None of these are fatal to the transport. Delivery failures that a caller
/// should see are turned into error-shaped response values instead; this type
/// covers what the transport reports about itself.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket connect failed: {0}")]
    Connect(String),

    #[error("Failed to send: {0}")]
    Send(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("No registered callback for message id {0}")]
    UnknownReplyId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, TransportError>;
