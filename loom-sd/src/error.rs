//! Error types for loom-sd
//!
//! Selection engines report an exhausted candidate pool as a soft failure
//! (empty result plus reason), never as an error.

use thiserror::Error;

/// Main error type for loom-sd
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors surfaced by loom-common
    #[error(transparent)]
    Common(#[from] loom_common::Error),

    /// Malformed scheduling request, rejected before the engine runs
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stored data could not be decoded
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Playback driver errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using loom-sd Error
pub type Result<T> = std::result::Result<T, Error>;
