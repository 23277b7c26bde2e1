//! Error types for memrelay
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for memrelay operations
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    /// Framing violation. The connection that produced it must be closed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Stored blob carries an unknown tag byte
    #[error("Invalid internal value: {0}")]
    InvalidValue(String),

    // -------------------------------------------------------------------------
    // Proxy Errors
    // -------------------------------------------------------------------------
    #[error("Backend error: {0}")]
    Backend(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// True for errors that describe a peer hanging up rather than a fault
    pub fn is_disconnect(&self) -> bool {
        match self {
            RelayError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
