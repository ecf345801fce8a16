//! Error types for shared-memory operations.

use thiserror::Error;

/// Errors that can occur while creating or using a shared-memory segment.
#[derive(Error, Debug)]
pub enum ShmError {
    /// Segment already exists.
    #[error("segment already exists: {name}")]
    AlreadyExists { name: String },

    /// Segment not found.
    #[error("segment not found: {name}")]
    NotFound { name: String },

    /// Invalid segment size.
    #[error("invalid segment size: {size} bytes")]
    InvalidSize { size: usize },

    /// Index out of bounds for a fixed-layout cell array.
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Process not found or already dead.
    #[error("process not found: {pid}")]
    ProcessNotFound { pid: u32 },

    /// Log bus writer thread has already stopped.
    #[error("log bus is stopped")]
    BusStopped,

    /// IO error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type for shared memory operations.
pub type ShmResult<T> = Result<T, ShmError>;
