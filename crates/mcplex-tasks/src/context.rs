//! The context handed to running task work.
//!
//! Status transitions go through the store (which enforces terminal
//! immutability) and are mirrored to the peer as best-effort
//! `notifications/tasks/status`. Mid-task interactive calls (`elicit`,
//! `create_message`) do not send directly: they queue a request carrying a
//! resolver and wait for the reply the response router delivers when the
//! polling client answers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use mcplex_core::meta;
use mcplex_core::methods;
use mcplex_core::protocol::Request;
use mcplex_core::types::{
    CreateMessageParams, CreateTaskResult, ElicitParams, ElicitResult, GetTaskParams, Task,
    TaskId, TaskStatus,
};
use mcplex_core::McplexError;
use mcplex_session::{CancellationToken, PeerHandle};

use crate::queue::{QueuedMessage, TaskMessageQueue};
use crate::resolver::Resolver;
use crate::store::TaskStore;

/// Default interval for polling a peer's task, when the peer suggests
/// none.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Context for work running as a task.
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    store: Arc<dyn TaskStore>,
    queue: Arc<TaskMessageQueue>,
    peer: PeerHandle,
    max_queue_size: Option<usize>,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        store: Arc<dyn TaskStore>,
        queue: Arc<TaskMessageQueue>,
        peer: PeerHandle,
        max_queue_size: Option<usize>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            store,
            queue,
            peer,
            max_queue_size,
            cancel,
        }
    }

    /// The task this context belongs to.
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Whether the task has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cancellation token shared with `tasks/cancel`.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Current task snapshot.
    pub async fn snapshot(&self) -> Result<Task, McplexError> {
        self.store
            .get(&self.task_id)
            .await?
            .ok_or_else(|| McplexError::task_not_found(self.task_id.as_str()))
    }

    async fn set_status(
        &self,
        status: Option<TaskStatus>,
        message: Option<String>,
    ) -> Result<Task, McplexError> {
        let task = self.store.update(&self.task_id, status, message).await?;
        self.emit_status(&task).await;
        Ok(task)
    }

    /// Best-effort `notifications/tasks/status`.
    async fn emit_status(&self, task: &Task) {
        let Ok(Value::Object(mut params)) = serde_json::to_value(task) else {
            return;
        };
        params.insert(
            "_meta".to_string(),
            Value::Object(meta::related_task_meta(self.task_id.as_str())),
        );
        if let Err(e) = self
            .peer
            .notify(methods::NOTIFICATION_TASK_STATUS, Some(Value::Object(params)))
            .await
        {
            debug!(task_id = %self.task_id, error = %e, "failed to send task status notification");
        }
    }

    /// Update the human-readable status message.
    pub async fn update_status(&self, message: impl Into<String>) -> Result<Task, McplexError> {
        self.set_status(None, Some(message.into())).await
    }

    /// Transition the task to `input_required`.
    pub async fn set_input_required(
        &self,
        message: Option<String>,
    ) -> Result<Task, McplexError> {
        self.set_status(Some(TaskStatus::InputRequired), message)
            .await
    }

    /// Store the result and complete the task.
    pub async fn complete(&self, result: Value) -> Result<Task, McplexError> {
        self.store.store_result(&self.task_id, result).await?;
        self.set_status(Some(TaskStatus::Completed), None).await
    }

    /// Fail the task.
    pub async fn fail(&self, message: impl Into<String>) -> Result<Task, McplexError> {
        self.set_status(Some(TaskStatus::Failed), Some(message.into()))
            .await
    }

    /// Cancel the task, draining its queue and rejecting queued resolvers.
    pub async fn cancel_task(&self, message: Option<String>) -> Result<Task, McplexError> {
        let task = self.set_status(Some(TaskStatus::Cancelled), message).await?;
        self.cancel.cancel();
        for entry in self.queue.drain(&self.task_id).await {
            if let Some(resolver) = entry.resolver {
                resolver.reject(McplexError::request_cancelled(
                    entry.message.method().unwrap_or("queued request"),
                ));
            }
        }
        Ok(task)
    }

    fn related_meta(&self) -> Map<String, Value> {
        meta::related_task_meta(self.task_id.as_str())
    }

    fn require_peer(&self) -> Result<mcplex_session::NegotiatedPeer, McplexError> {
        self.peer
            .negotiated()
            .ok_or_else(|| McplexError::InvalidState {
                message: "session handshake not complete".to_string(),
            })
    }

    /// Queue a request for the polling client and wait for the routed
    /// reply.
    async fn request_via_queue(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, McplexError> {
        let id = self.peer.next_request_id();
        let request = Request::with_params(method.to_string(), id, params);
        let resolver = Resolver::new();
        self.queue
            .enqueue(
                &self.task_id,
                QueuedMessage::request_with_resolver(request, resolver.clone()),
                self.max_queue_size,
            )
            .await?;
        resolver.wait().await
    }

    /// Queue a request bracketed by the `working → input_required →
    /// working` transitions.
    async fn interactive_request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, McplexError> {
        self.set_status(Some(TaskStatus::InputRequired), None).await?;
        let outcome = self.request_via_queue(method, params).await;
        // Return to working on both paths; refused transitions (the task
        // went terminal meanwhile) are logged only.
        if let Err(e) = self.set_status(Some(TaskStatus::Working), None).await {
            debug!(task_id = %self.task_id, error = %e, "could not return task to working");
        }
        outcome
    }

    /// Ask the requesting side for structured input (form mode).
    pub async fn elicit(
        &self,
        message: impl Into<String>,
        requested_schema: Value,
    ) -> Result<ElicitResult, McplexError> {
        if !self.require_peer()?.supports_elicitation() {
            return Err(McplexError::CapabilityNotSupported {
                capability: "elicitation".to_string(),
            });
        }
        let mut params = ElicitParams::form(message, requested_schema);
        params.meta = Some(self.related_meta());
        let value = self
            .interactive_request(methods::ELICITATION_CREATE, serde_json::to_value(params)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send the requesting side to a URL (url mode).
    pub async fn elicit_url(
        &self,
        message: impl Into<String>,
        url: impl Into<String>,
        elicitation_id: impl Into<String>,
    ) -> Result<ElicitResult, McplexError> {
        if !self.require_peer()?.supports_url_elicitation() {
            return Err(McplexError::CapabilityNotSupported {
                capability: "elicitation.url".to_string(),
            });
        }
        let mut params = ElicitParams::url_mode(message, url, elicitation_id);
        params.meta = Some(self.related_meta());
        let value = self
            .interactive_request(methods::ELICITATION_CREATE, serde_json::to_value(params)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the requesting side to sample its model.
    pub async fn create_message(
        &self,
        mut params: CreateMessageParams,
    ) -> Result<Value, McplexError> {
        if !self.require_peer()?.supports_sampling() {
            return Err(McplexError::CapabilityNotSupported {
                capability: "sampling".to_string(),
            });
        }
        let mut related = self.related_meta();
        if let Some(existing) = params.meta.take() {
            related.extend(existing);
        }
        params.meta = Some(related);
        self.interactive_request(
            methods::SAMPLING_CREATE_MESSAGE,
            serde_json::to_value(params)?,
        )
        .await
    }

    /// Elicit as a task on the requesting side: the peer answers with its
    /// own `CreateTaskResult`, which this call polls to terminal status
    /// before decoding the final payload.
    pub async fn elicit_as_task(
        &self,
        message: impl Into<String>,
        requested_schema: Value,
        ttl: Option<u64>,
    ) -> Result<ElicitResult, McplexError> {
        let peer = self.require_peer()?;
        if !peer.supports_elicitation() {
            return Err(McplexError::CapabilityNotSupported {
                capability: "elicitation".to_string(),
            });
        }
        if !peer.supports_tasks() {
            return Err(McplexError::CapabilityNotSupported {
                capability: "tasks".to_string(),
            });
        }

        let mut params = ElicitParams::form(message, requested_schema);
        let mut related = self.related_meta();
        related.insert(meta::TASK.to_string(), serde_json::json!({ "ttl": ttl }));
        params.meta = Some(related);

        self.set_status(Some(TaskStatus::InputRequired), None).await?;
        let outcome = self
            .run_peer_task(methods::ELICITATION_CREATE, serde_json::to_value(params)?)
            .await;
        if let Err(e) = self.set_status(Some(TaskStatus::Working), None).await {
            debug!(task_id = %self.task_id, error = %e, "could not return task to working");
        }
        Ok(serde_json::from_value(outcome?)?)
    }

    /// Sample as a task on the requesting side.
    pub async fn create_message_as_task(
        &self,
        mut params: CreateMessageParams,
        ttl: Option<u64>,
    ) -> Result<Value, McplexError> {
        let peer = self.require_peer()?;
        if !peer.supports_sampling() {
            return Err(McplexError::CapabilityNotSupported {
                capability: "sampling".to_string(),
            });
        }
        if !peer.supports_tasks() {
            return Err(McplexError::CapabilityNotSupported {
                capability: "tasks".to_string(),
            });
        }

        let mut related = self.related_meta();
        if let Some(existing) = params.meta.take() {
            related.extend(existing);
        }
        related.insert(meta::TASK.to_string(), serde_json::json!({ "ttl": ttl }));
        params.meta = Some(related);

        self.set_status(Some(TaskStatus::InputRequired), None).await?;
        let outcome = self
            .run_peer_task(
                methods::SAMPLING_CREATE_MESSAGE,
                serde_json::to_value(params)?,
            )
            .await;
        if let Err(e) = self.set_status(Some(TaskStatus::Working), None).await {
            debug!(task_id = %self.task_id, error = %e, "could not return task to working");
        }
        outcome
    }

    /// Send a task-augmented request, poll the peer's task to a terminal
    /// status, and fetch the final payload.
    async fn run_peer_task(&self, method: &str, params: Value) -> Result<Value, McplexError> {
        let created = self.request_via_queue(method, params).await?;
        let created: CreateTaskResult = serde_json::from_value(created)?;
        let peer_task_id = created.task.task_id.clone();
        let mut interval = created
            .task
            .poll_interval
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);

        let get_params = serde_json::to_value(GetTaskParams {
            task_id: peer_task_id.clone(),
        })?;
        loop {
            tokio::time::sleep(interval).await;
            let snapshot = self
                .request_via_queue(methods::TASKS_GET, get_params.clone())
                .await?;
            let snapshot: Task = serde_json::from_value(snapshot)?;
            if snapshot.status.is_terminal() {
                break;
            }
            if let Some(suggested) = snapshot.poll_interval {
                interval = Duration::from_millis(suggested);
            }
        }

        self.request_via_queue(methods::TASKS_RESULT, get_params)
            .await
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("is_cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
