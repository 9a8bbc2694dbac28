//! Routing replies to resolvers waiting inside running tasks.

use std::sync::Arc;

use mcplex_core::protocol::Response;
use mcplex_core::McplexError;
use mcplex_session::handler::BoxFuture;
use mcplex_session::ResponseRouter;

use crate::queue::TaskMessageQueue;

/// Claims responses whose id matches a queued resolver.
///
/// Consulted by the dispatch loop before normal pending-request matching;
/// this is how a mid-task `elicit()` or `create_message()` resumes when
/// the polling client answers.
pub struct TaskResponseRouter {
    queue: Arc<TaskMessageQueue>,
}

impl TaskResponseRouter {
    /// Create a router over the task message queue.
    #[must_use]
    pub fn new(queue: Arc<TaskMessageQueue>) -> Self {
        Self { queue }
    }
}

impl ResponseRouter for TaskResponseRouter {
    fn route<'a>(&'a self, response: &'a Response) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let Some(resolver) = self.queue.take_resolver(&response.id).await else {
                return false;
            };
            match response.clone().into_result() {
                Ok(value) => resolver.resolve(value),
                Err(error) => resolver.reject(McplexError::from(error)),
            }
            true
        })
    }
}
