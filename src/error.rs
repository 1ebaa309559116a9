//! Error types for lotwire.

use thiserror::Error;

/// Main error type for all lotwire operations.
#[derive(Debug, Error)]
pub enum LotError {
    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Control line could not be parsed.
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Segment bytes could not be parsed.
    #[error("Malformed segment: {0}")]
    MalformedSegment(String),

    /// File content type could not be classified.
    #[error("Unsupported file type: {0} (supported types: PNG, JPG, TXT)")]
    UnsupportedFileType(String),

    /// Alert input rejected before encoding.
    #[error("Invalid alert input: {0}")]
    InvalidAlertInput(String),

    /// Filename does not fit in the first segment header.
    #[error("Filename length {len} exceeds maximum {max}")]
    FilenameTooLong { len: usize, max: usize },

    /// File exceeds the size the header or configuration allows.
    #[error("File size {size} exceeds maximum {max}")]
    FileTooLarge { size: u64, max: u64 },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sender or egress channel closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using LotError.
pub type Result<T> = std::result::Result<T, LotError>;
