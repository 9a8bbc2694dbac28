//! Transport error type.

use thiserror::Error;

/// Errors produced by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is not connected.
    #[error("transport is not connected")]
    NotConnected,

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// An I/O error occurred.
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),
}
