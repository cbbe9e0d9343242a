//! Error types for tradechat-core

use thiserror::Error;

/// Result type alias using tradechat-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tradechat-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Backing store read/write failure
    #[error("Store error: {0}")]
    Store(String),

    /// Attachment upload failure
    #[error("Upload error: {0}")]
    Upload(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
