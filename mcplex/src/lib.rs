//! mcplex: a bidirectional JSON-RPC 2.0 session runtime for the Model
//! Context Protocol.
//!
//! The runtime mediates between a host (client or server application) and
//! a remote peer over one transport:
//!
//! - request/response correlation with timeouts and cancellation
//! - the lifecycle handshake (capability negotiation, protocol version
//!   check)
//! - progress tokens routed to per-request callbacks, optionally
//!   extending request deadlines
//! - task-augmented requests: long-running work with status/result
//!   polling and a mid-task side channel for elicitation and sampling
//!
//! # Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | [`mcplex_core`] | wire codec, protocol types, errors, capabilities |
//! | [`mcplex_transport`] | the transport contract and memory transport |
//! | [`mcplex_session`] | registry, dispatch loop, session state machine |
//! | [`mcplex_tasks`] | task store, message queue, resolvers, task host |
//!
//! # Example
//!
//! ```no_run
//! use mcplex::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), McplexError> {
//! let (client_side, server_side) = MemoryTransport::pair();
//!
//! let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));
//! server.on_request(
//!     "echo",
//!     request_handler(|_ctx, params| async move { Ok(json!({ "echo": params })) }),
//! );
//!
//! let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "1.0")));
//! let (c, s) = tokio::join!(client.connect(client_side), server.connect(server_side));
//! c?;
//! s?;
//!
//! let result = client
//!     .request("echo", Some(json!({"x": 1})), RequestOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod prelude;

/// Core protocol types and the wire codec.
pub mod core {
    pub use mcplex_core::*;
}

/// The session runtime.
pub mod session {
    pub use mcplex_session::*;
}

/// Task-augmented request support.
pub mod tasks {
    pub use mcplex_tasks::*;
}

/// The transport contract and memory transport.
pub mod transport {
    pub use mcplex_transport::*;
}

pub use mcplex_core::McplexError;
pub use mcplex_session::{
    notification_handler, request_handler, BatchRequest, PeerHandle, RequestContext,
    RequestOptions, Session, SessionOptions, SessionState,
};
pub use mcplex_tasks::{TaskClient, TaskContext, TaskHost};
pub use mcplex_transport::{MemoryTransport, Transport};
