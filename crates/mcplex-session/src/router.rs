//! Response interception for out-of-band resolution.
//!
//! The dispatch loop consults registered routers *before* normal
//! pending-request matching. A router returns `true` iff it consumed the
//! response. This is how a reply routed to a resolver waiting inside a
//! running task bypasses the registry.

use mcplex_core::protocol::Response;

use crate::handler::BoxFuture;

/// An interception hook in the dispatch loop that can claim a response
/// before standard request/response matching.
pub trait ResponseRouter: Send + Sync {
    /// Attempt to consume a response. Return `true` iff consumed.
    fn route<'a>(&'a self, response: &'a Response) -> BoxFuture<'a, bool>;
}
