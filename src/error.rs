//! Error types for the Telar gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Telar gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Messaging platform error (outbound sends)
    #[error("channel error: {0}")]
    Channel(String),

    /// Media transfer error (resolve, download, upload)
    #[error("media error: {0}")]
    Media(String),

    /// Language-model provider error
    #[error("llm error: {0}")]
    Llm(String),

    /// Model inference or heatmap rendering error
    #[error("inference error: {0}")]
    Inference(String),

    /// Malformed or unexpected webhook event shape
    #[error("malformed event: {0}")]
    Classification(String),

    /// Registration conflict: the sender identity already exists
    #[error("sender already registered: {0}")]
    AlreadyRegistered(String),

    /// Database pool error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
