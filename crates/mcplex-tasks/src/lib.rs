//! Task-augmented requests for the mcplex session runtime.
//!
//! A task-augmented request answers immediately with a `CreateTaskResult`
//! and continues running server-side. The requesting peer fetches the
//! eventual payload through a `tasks/result` long-poll; while the task
//! runs, the handler can reach back to the requester (elicitation,
//! sampling) through a per-task FIFO side channel whose replies are routed
//! to resolvers by a response router.
//!
//! The pieces:
//!
//! - [`TaskStore`]: pluggable persistence for task records and results,
//!   with an [`InMemoryTaskStore`] default
//! - [`TaskMessageQueue`]: the per-task FIFO plus resolver table
//! - [`Resolver`]: one-shot cell bridging enqueue-and-wait to the routed
//!   response
//! - [`TaskResponseRouter`]: claims responses addressed to queued resolvers
//! - [`TaskContext`]: handed to running task work; status transitions and
//!   mid-task `elicit` / `create_message` calls
//! - [`TaskHost`]: owns store and queue, serves the `tasks/*` methods, and
//!   spawns task workers via [`TaskHost::run_task`]
//! - [`TaskClient`]: the requesting side's view of a peer's tasks
//!   (create, poll, cancel, fetch results)

pub mod client;
pub mod context;
pub mod host;
pub mod queue;
pub mod resolver;
pub mod router;
pub mod signal;
pub mod store;

pub use client::TaskClient;
pub use context::TaskContext;
pub use host::TaskHost;
pub use queue::{QueuedMessage, TaskMessageQueue};
pub use resolver::Resolver;
pub use router::TaskResponseRouter;
pub use signal::TaskSignals;
pub use store::{InMemoryTaskStore, TaskStore};
