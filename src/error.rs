//! Error types for the gab-rs library.

use std::io;

/// Result type alias for gab-rs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during protocol and storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("frame of {len} bytes exceeds the {max} byte cap")]
    FrameTooLarge { len: usize, max: usize },

    #[error("handshake proof did not match the challenge")]
    HandshakeFailed,

    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    #[error("protocol error: {0}")]
    Protocol(String),
}
