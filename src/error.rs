//! Error types for rapidpy
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur while supervising workers
#[derive(Debug, Error)]
pub enum RapidError {
    /// Manifest could not be fetched or decoded
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Application artifacts could not be materialized locally
    #[error("Sync error: {0}")]
    Sync(String),

    /// Run-mode directive missing or malformed
    #[error("Directive error: {0}")]
    Directive(String),

    /// Worker process could not be started
    #[error("Launch error: {0}")]
    Launch(String),

    /// Worker process could not be killed
    #[error("Kill error: {0}")]
    Kill(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for rapidpy operations
pub type Result<T> = std::result::Result<T, RapidError>;
