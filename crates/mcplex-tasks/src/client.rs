//! The requesting side's view of a peer's tasks.
//!
//! [`TaskClient`] wraps a [`PeerHandle`] with the polling choreography a
//! caller needs after sending a task-augmented request: watch the task
//! until it reaches a terminal status, then fetch the final payload
//! through `tasks/result`.

use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use mcplex_core::methods;
use mcplex_core::types::{
    CreateTaskResult, GetTaskParams, ListTasksParams, ListTasksResult, Task, TaskId, TaskMetadata,
};
use mcplex_core::McplexError;
use mcplex_session::{PeerHandle, RequestOptions};

/// Default interval for polling a peer's task, when the peer suggests
/// none.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Task operations against the remote peer.
#[derive(Clone)]
pub struct TaskClient {
    peer: PeerHandle,
}

impl TaskClient {
    /// Create a task client over a peer handle.
    #[must_use]
    pub fn new(peer: PeerHandle) -> Self {
        Self { peer }
    }

    /// Send a task-augmented request.
    ///
    /// The peer answers immediately with a `CreateTaskResult`; fetch the
    /// eventual payload with [`TaskClient::wait_for_result`].
    pub async fn call_as_task(
        &self,
        method: &str,
        params: Option<Value>,
        metadata: TaskMetadata,
    ) -> Result<CreateTaskResult, McplexError> {
        let value = self
            .peer
            .request(method, params, RequestOptions::default().as_task(metadata))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a snapshot of a peer task.
    pub async fn get(&self, task_id: &TaskId) -> Result<Task, McplexError> {
        let value = self
            .peer
            .request(
                methods::TASKS_GET,
                Some(self.task_params(task_id)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// List the peer's tasks, one page at a time.
    pub async fn list(&self, cursor: Option<String>) -> Result<ListTasksResult, McplexError> {
        let params = ListTasksParams { cursor };
        let value = self
            .peer
            .request(
                methods::TASKS_LIST,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Request cancellation of a peer task.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<Task, McplexError> {
        let value = self
            .peer
            .request(
                methods::TASKS_CANCEL,
                Some(self.task_params(task_id)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Long-poll `tasks/result` for the task's final payload.
    ///
    /// The poll blocks server-side until the task is terminal; queued
    /// side-channel requests arrive as ordinary inbound requests while it
    /// waits, so the session's handlers keep running.
    pub async fn result(&self, task_id: &TaskId) -> Result<Value, McplexError> {
        self.peer
            .request(
                methods::TASKS_RESULT,
                Some(self.task_params(task_id)?),
                RequestOptions::default().without_timeout(),
            )
            .await
    }

    /// Poll a created task to a terminal status, then fetch its result.
    ///
    /// Polling uses the peer-suggested `pollInterval`, defaulting to
    /// 500 ms. Prefer [`TaskClient::result`] when the session stays
    /// connected; polling suits callers that may reconnect between
    /// checks.
    pub async fn wait_for_result(&self, created: &CreateTaskResult) -> Result<Value, McplexError> {
        let task_id = &created.task.task_id;
        let mut interval = created
            .task
            .poll_interval
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);

        loop {
            let snapshot = self.get(task_id).await?;
            trace!(%task_id, status = %snapshot.status, "polled task");
            if snapshot.status.is_terminal() {
                break;
            }
            if let Some(suggested) = snapshot.poll_interval {
                interval = Duration::from_millis(suggested);
            }
            tokio::time::sleep(interval).await;
        }

        self.result(task_id).await
    }

    fn task_params(&self, task_id: &TaskId) -> Result<Value, McplexError> {
        Ok(serde_json::to_value(GetTaskParams {
            task_id: task_id.clone(),
        })?)
    }
}
