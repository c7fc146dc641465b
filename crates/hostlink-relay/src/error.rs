//! Relay error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Connection registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Admission refused; the offending accept fails, the server
    /// continues.
    #[error("connection limit reached ({limit})")]
    ResourceExhausted { limit: usize },

    /// The connection closed before the operation landed. A benign
    /// race, handled as a warn-and-ignore by callers.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(#[from] hostlink_transport::TransportError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("protocol error: {0}")]
    Protocol(#[from] hostlink_core::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
