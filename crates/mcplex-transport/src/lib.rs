//! Transport contract for the mcplex session runtime.
//!
//! A transport is a full-duplex channel delivering classified JSON-RPC
//! frames with optional per-message metadata. The session runtime consumes
//! exactly one transport per session and is the single consumer of its
//! receive side.
//!
//! Concrete network transports (stdio, Streamable HTTP, WebSocket) live
//! outside this crate; it ships only the [`Transport`] contract and the
//! in-process [`MemoryTransport`] used for testing and same-process
//! sessions.
//!
//! # Example
//!
//! ```rust
//! use mcplex_transport::{MemoryTransport, Transport};
//!
//! // Create a pair of connected transports.
//! let (client, server) = MemoryTransport::pair();
//! assert!(client.is_connected());
//! assert!(server.is_connected());
//! ```

pub mod error;
pub mod memory;
pub mod traits;

pub use error::TransportError;
pub use memory::MemoryTransport;
pub use traits::{MessageMeta, Transport, TransportMessage, TransportMetadata};
