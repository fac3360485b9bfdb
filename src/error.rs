//! Error types for the Hookgate service.

use thiserror::Error;

/// Main error type for Hookgate operations.
#[derive(Error, Debug)]
pub enum HookgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store failures; transient from the caller's point of view
    #[error("Storage error: {0}")]
    Storage(String),

    /// Webhook signature verification failures
    #[error("Signature error: {0}")]
    Signature(String),

    /// Status relay failures
    #[error("Relay error: {0}")]
    Relay(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for HookgateError {
    fn from(err: config::ConfigError) -> Self {
        HookgateError::Config(err.to_string())
    }
}

/// Result type alias for Hookgate operations.
pub type Result<T> = std::result::Result<T, HookgateError>;
