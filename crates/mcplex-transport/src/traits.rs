//! The transport contract consumed by the session runtime.
//!
//! The contract says nothing about delivery ordering beyond: each frame is
//! delivered exactly once to the single receive-side consumer, in the order
//! the peer sent it.

use mcplex_core::protocol::{Frame, RequestId};
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

/// Metadata about a transport connection.
#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    /// Transport type identifier (e.g., "memory", "stdio", "http").
    pub transport_type: String,
    /// Remote address, if applicable.
    pub remote_addr: Option<String>,
    /// Local address, if applicable.
    pub local_addr: Option<String>,
    /// When the connection was established.
    pub connected_at: Option<Instant>,
}

impl TransportMetadata {
    /// Create new metadata for a transport type.
    #[must_use]
    pub fn new(transport_type: impl Into<String>) -> Self {
        Self {
            transport_type: transport_type.into(),
            remote_addr: None,
            local_addr: None,
            connected_at: None,
        }
    }

    /// Set the remote address.
    #[must_use]
    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Set the local address.
    #[must_use]
    pub fn local_addr(mut self, addr: impl Into<String>) -> Self {
        self.local_addr = Some(addr.into());
        self
    }

    /// Mark the connection time.
    #[must_use]
    pub fn connected_now(mut self) -> Self {
        self.connected_at = Some(Instant::now());
        self
    }
}

/// Per-message metadata attached by the transport.
#[derive(Debug, Clone, Default)]
pub struct MessageMeta {
    /// Session identifier, for transports that multiplex sessions.
    pub session_id: Option<String>,
    /// Authentication info established by the transport layer.
    pub auth_info: Option<serde_json::Value>,
    /// Request-level transport details (e.g. HTTP headers).
    pub request_info: Option<HashMap<String, String>>,
}

/// A received frame plus its transport-level metadata.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// The classified frame.
    pub frame: Frame,
    /// Metadata attached by the transport.
    pub meta: MessageMeta,
}

impl TransportMessage {
    /// Wrap a frame with empty metadata.
    #[must_use]
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            meta: MessageMeta::default(),
        }
    }
}

impl From<Frame> for TransportMessage {
    fn from(frame: Frame) -> Self {
        Self::new(frame)
    }
}

/// Core transport trait for session communication.
///
/// Implementations must be `Send + Sync`; the send and receive sides are
/// independent and are called from different tasks.
pub trait Transport: Send + Sync {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the channel. Idempotent when already connected.
    fn connect(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the channel. Guaranteed to terminate [`Transport::recv`]
    /// promptly.
    fn disconnect(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a frame.
    ///
    /// `related_request_id` is a hint for transports that multiplex
    /// delivery by originating request (Streamable HTTP); others ignore it.
    fn send(
        &self,
        frame: Frame,
        related_request_id: Option<&RequestId>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` when the connection has cleanly ended.
    fn recv(&self) -> impl Future<Output = Result<Option<TransportMessage>, Self::Error>> + Send;

    /// Record the negotiated protocol version after the handshake.
    ///
    /// Transports that include the version in framing (HTTP headers) use
    /// it; the default is a no-op.
    fn set_protocol_version(&self, version: &str) {
        let _ = version;
    }

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Get metadata about the transport.
    fn metadata(&self) -> TransportMetadata;
}
