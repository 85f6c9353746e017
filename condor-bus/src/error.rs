//! Error types for the bus client

use thiserror::Error;

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur when talking to the broker
#[derive(Debug, Error)]
pub enum BusError {
    /// ZeroMQ socket failure
    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    /// Message body could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A frame was missing or malformed
    #[error("transport error: {0}")]
    Transport(String),

    /// The bus has been shut down
    #[error("bus closed")]
    Closed,
}

impl BusError {
    /// Check if this error means no further messages can be exchanged
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
