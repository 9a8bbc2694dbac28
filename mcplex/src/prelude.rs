//! Convenient imports for common mcplex use.
//!
//! ```rust
//! use mcplex::prelude::*;
//! ```

pub use mcplex_core::capability::{ClientCapabilities, ServerCapabilities};
pub use mcplex_core::error::JsonRpcError;
pub use mcplex_core::protocol::{
    Frame, Message, Notification, ProgressToken, Request, RequestId, Response,
};
pub use mcplex_core::protocol_version::ProtocolVersion;
pub use mcplex_core::types::{
    ClientInfo, CreateMessageParams, CreateTaskResult, ElicitParams, ElicitResult, ServerInfo,
    Task, TaskId, TaskMetadata, TaskStatus,
};
pub use mcplex_core::McplexError;

pub use mcplex_session::{
    notification_handler, request_handler, CancellationToken, NotificationHandler, PeerHandle,
    RequestContext, RequestHandler, RequestOptions, ResponseRouter, Role, Session, SessionOptions,
    SessionState,
};

pub use mcplex_tasks::{
    InMemoryTaskStore, TaskClient, TaskContext, TaskHost, TaskMessageQueue, TaskStore,
};

pub use mcplex_transport::{MemoryTransport, MessageMeta, Transport, TransportMessage};
