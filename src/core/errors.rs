//! Error types shared across the chat core.

use thiserror::Error;

/// Core error type for configuration and start-up.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
