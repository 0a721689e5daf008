//! Error types for the Ridegate service.

use thiserror::Error;

/// Main error type for Ridegate operations.
///
/// Quota and block outcomes are not errors; they are reported through
/// [`crate::ratelimit::Decision`].
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Serve(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for Ridegate operations.
pub type Result<T> = std::result::Result<T, GateError>;
