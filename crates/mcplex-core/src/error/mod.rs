//! Unified error handling for the mcplex runtime.
//!
//! A single, context-rich error type covers the whole stack:
//!
//! - **Single error type**: everything flows through [`McplexError`]
//! - **JSON-RPC compatible**: every variant maps to a wire error code
//! - **Diagnostic-friendly**: integrates with [`miette`] for error reports
//! - **Size-conscious**: large variants are boxed so
//!   `Result<T, McplexError>` stays small
//!
//! The propagation policy follows the session boundary: errors are handled
//! locally wherever possible; only protocol-typed errors
//! ([`McplexError::is_protocol`]) are ever serialized for the peer, and
//! non-protocol errors crossing the boundary are replaced by a sanitized
//! internal error while the full detail goes to the log.

pub mod codes;
mod jsonrpc;
mod types;

pub use codes::*;
pub use jsonrpc::JsonRpcError;
pub use types::{BoxError, HandshakeDetails, McplexError};
