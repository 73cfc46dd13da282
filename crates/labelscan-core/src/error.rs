//! Error types for labelscan.

use thiserror::Error;

/// Result type alias using labelscan's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for labelscan operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Image download or data-URI decode failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Model call failed (HTTP failure, empty response, retry exhaustion)
    #[error("Inference error: {0}")]
    Inference(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
