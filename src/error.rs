//! Error types for api-conductor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request {id} superseded by a newer request with the same id")]
    Superseded { id: String },

    #[error("request {id} cancelled before dispatch")]
    Cancelled { id: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Was this request replaced or cancelled before it ever reached the transport?
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Error::Superseded { .. } | Error::Cancelled { .. })
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The upstream answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The call itself failed (connection, decode, panic in the transport task).
    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
