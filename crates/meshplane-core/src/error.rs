//! Shared error types for the meshplane core.

use thiserror::Error;

/// Top-level error type for the meshplane core.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The transport below a channel failed to deliver a frame.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An auth collaborator call failed.
    #[error("Auth error: {0}")]
    Auth(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Alias for Result with MeshError.
pub type MeshResult<T> = Result<T, MeshError>;
