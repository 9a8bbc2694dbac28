//! Core types for the mcplex session runtime.
//!
//! This crate provides the foundation shared by every other mcplex crate:
//!
//! - [`protocol`]: JSON-RPC 2.0 message shapes (requests, responses,
//!   notifications, batches) and identifier types
//! - [`codec`]: frame classification and canonical encoding, including
//!   `_meta` injection for outbound requests
//! - [`error`]: the unified [`error::McplexError`] type and JSON-RPC error
//!   codes
//! - [`capability`]: capability bags negotiated during initialization
//! - [`protocol_version`]: protocol version negotiation
//! - [`types`]: handshake, progress, cancellation, task, and interaction
//!   parameter types
//!
//! The crate is transport- and runtime-agnostic: it contains no I/O and no
//! async code beyond plain data types.

pub mod capability;
pub mod codec;
pub mod error;
pub mod meta;
pub mod methods;
pub mod protocol;
pub mod protocol_version;
pub mod types;

pub use error::McplexError;
pub use protocol::{Frame, Message, Notification, ProgressToken, Request, RequestId, Response};
