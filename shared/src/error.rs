//! Error types for the smart home skill.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a directive.
///
/// Protocol-level faults (a malformed envelope or an unsupported payload
/// version) are not errors; they are answered with a well-formed
/// `ErrorResponse` envelope. Everything here propagates as the failure of
/// the whole invocation, which the platform reports to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Wyze API rejected a call
    #[error("Wyze API error: {0}")]
    Api(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}
