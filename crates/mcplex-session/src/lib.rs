//! Bidirectional JSON-RPC 2.0 session runtime.
//!
//! A [`Session`] binds one transport and mediates between the local host
//! (client or server application) and the remote peer:
//!
//! - outgoing requests are correlated with incoming responses through the
//!   pending-request registry, with timeouts and cancellation
//! - incoming requests and notifications are dispatched to registered
//!   handlers; each inbound request runs in its own worker so handlers can
//!   issue nested requests back to the peer
//! - progress notifications are routed to per-request callbacks and can
//!   extend request deadlines
//! - the lifecycle handshake (capability negotiation, protocol version
//!   check) gates all other traffic
//!
//! Both peers may originate requests simultaneously; the runtime is fully
//! duplex and never blocks the dispatch loop on handler work.
//!
//! # Example
//!
//! ```no_run
//! use mcplex_session::{Session, SessionOptions, RequestOptions};
//! use mcplex_core::types::ClientInfo;
//! use mcplex_transport::MemoryTransport;
//!
//! # async fn example() -> Result<(), mcplex_core::McplexError> {
//! let (client_side, _server_side) = MemoryTransport::pair();
//!
//! let session = Session::new(SessionOptions::client(ClientInfo::new("demo", "0.1")));
//! session.connect(client_side).await?;
//!
//! let result = session
//!     .request("ping", None, RequestOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cancellation;
pub mod context;
pub mod dispatch;
pub mod handler;
pub mod options;
pub mod registry;
pub mod router;
pub mod session;
pub mod timeout;

pub use cancellation::CancellationToken;
pub use context::{PeerHandle, RequestContext};
pub use handler::{notification_handler, request_handler, NotificationHandler, RequestHandler};
pub use options::{RequestOptions, Role, SessionOptions};
pub use registry::{PendingRegistry, ProgressCallback};
pub use router::ResponseRouter;
pub use session::{BatchRequest, NegotiatedPeer, Session, SessionState};
pub use timeout::TimeoutController;
