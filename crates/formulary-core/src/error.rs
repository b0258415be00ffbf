//! Error types for formulary-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or querying a schema
#[derive(Debug, Error)]
pub enum Error {
    /// Schema metadata is structurally invalid
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Two fields share the same id
    #[error("Duplicate field id: {0}")]
    DuplicateField(String),

    /// Two tables share the same id
    #[error("Duplicate table id: {0}")]
    DuplicateTable(String),

    /// Schema JSON could not be decoded
    #[error("Schema JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
