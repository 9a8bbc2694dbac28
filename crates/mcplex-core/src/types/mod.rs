//! Parameter and result types for the session runtime's wire surface.
//!
//! Only the shapes the runtime itself acts on are typed here; domain
//! payloads (tool arguments, sampling content, elicitation form schemas)
//! stay opaque `serde_json::Value`s and pass through untouched.

mod initialize;
mod interaction;
mod progress;
mod task;

pub use initialize::{ClientInfo, InitializeParams, InitializeResult, ServerInfo};
pub use interaction::{
    ElicitAction, ElicitParams, ElicitResult, ElicitationCompleteParams, ListRootsResult, Root,
    CreateMessageParams,
};
pub use progress::{CancelledParams, ProgressParams};
pub use task::{
    CreateTaskResult, GetTaskParams, ListTasksParams, ListTasksResult, Task, TaskId, TaskMetadata,
    TaskStatus,
};
