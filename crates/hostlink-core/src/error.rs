//! Error types for hostlink

use thiserror::Error;

/// Result type alias for hostlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol-level error types
#[derive(Error, Debug)]
pub enum Error {
    /// Frame was not a JSON object with a `kind` tag, or a known kind
    /// had a malformed body
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The `kind` tag names no known message kind
    #[error("unrecognized message kind: {0}")]
    UnknownKind(String),

    /// JSON encoding error
    #[error("encode error: {0}")]
    EncodeError(String),
}
