//! Error types for the protocol crate.

use thiserror::Error;

/// Validation failures for requests arriving from browser clients.
///
/// The `Display` text is what the client sees in the `message` field of a
/// failed response, so it must never carry server-side detail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The request body could not be decoded.
    #[error("invalid request parameters")]
    Malformed(String),

    /// The hostname field was empty.
    #[error("hostname must not be empty")]
    MissingHostname,

    /// The username field was empty.
    #[error("username must not be empty")]
    MissingUsername,

    /// The port was outside 1..=65535.
    #[error("invalid port range (1-65535)")]
    InvalidPort(i64),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(err.to_string())
    }
}
