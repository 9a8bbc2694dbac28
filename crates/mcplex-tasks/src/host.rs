//! The task host: serves the `tasks/*` methods and spawns task workers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use mcplex_core::meta;
use mcplex_core::methods;
use mcplex_core::types::{
    CreateTaskResult, GetTaskParams, ListTasksParams, ListTasksResult, Task, TaskId, TaskMetadata,
    TaskStatus,
};
use mcplex_core::McplexError;
use mcplex_session::{
    request_handler, CancellationToken, PeerHandle, RequestContext, Session,
};

use crate::context::TaskContext;
use crate::queue::TaskMessageQueue;
use crate::router::TaskResponseRouter;
use crate::signal::TaskSignals;
use crate::store::{InMemoryTaskStore, TaskStore};

/// Owns the task store and message queue, serves `tasks/get`,
/// `tasks/list`, `tasks/cancel`, and the `tasks/result` long-poll, and
/// spawns detached workers for task-augmented requests via
/// [`TaskHost::run_task`].
pub struct TaskHost {
    store: Arc<dyn TaskStore>,
    queue: Arc<TaskMessageQueue>,
    max_queue_size: Option<usize>,
    running: StdMutex<HashMap<TaskId, CancellationToken>>,
}

impl TaskHost {
    /// Create a host over an in-memory store.
    #[must_use]
    pub fn in_memory() -> Arc<Self> {
        let signals = Arc::new(TaskSignals::new());
        let store = Arc::new(InMemoryTaskStore::with_signals(Arc::clone(&signals)));
        Self::new(store, signals, None)
    }

    /// Create a host over a custom store.
    ///
    /// `signals` must be the registry the store notifies on updates, so
    /// queue activity and status changes share one wake-up path.
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        signals: Arc<TaskSignals>,
        max_queue_size: Option<usize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue: Arc::new(TaskMessageQueue::new(signals)),
            max_queue_size,
            running: StdMutex::new(HashMap::new()),
        })
    }

    /// The task store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    /// The per-task message queue.
    #[must_use]
    pub fn queue(&self) -> Arc<TaskMessageQueue> {
        Arc::clone(&self.queue)
    }

    /// Register the `tasks/*` handlers and the response router on a
    /// session. Call before `connect()`.
    pub fn attach(self: &Arc<Self>, session: &Session) {
        session.add_response_router(Arc::new(TaskResponseRouter::new(self.queue())));

        let host = Arc::clone(self);
        session.on_request(
            methods::TASKS_GET,
            request_handler(move |_ctx, params| {
                let host = Arc::clone(&host);
                async move { host.handle_get(params).await }
            }),
        );

        let host = Arc::clone(self);
        session.on_request(
            methods::TASKS_LIST,
            request_handler(move |_ctx, params| {
                let host = Arc::clone(&host);
                async move { host.handle_list(params).await }
            }),
        );

        let host = Arc::clone(self);
        session.on_request(
            methods::TASKS_CANCEL,
            request_handler(move |ctx, params| {
                let host = Arc::clone(&host);
                async move { host.handle_cancel(ctx.peer().clone(), params).await }
            }),
        );

        let host = Arc::clone(self);
        session.on_request(
            methods::TASKS_RESULT,
            request_handler(move |ctx, params| {
                let host = Arc::clone(&host);
                async move { host.handle_result(ctx, params).await }
            }),
        );
    }

    /// Run `work` as a task: create the record, spawn a detached worker,
    /// and return the `CreateTaskResult` immediately.
    ///
    /// The worker's outcome maps success to `completed` (unless the work
    /// already drove the task terminal), cancellation to `cancelled`, and
    /// errors to `failed`.
    pub async fn run_task<W, F>(
        self: &Arc<Self>,
        peer: PeerHandle,
        metadata: TaskMetadata,
        model_immediate_response: Option<Value>,
        work: W,
    ) -> Result<CreateTaskResult, McplexError>
    where
        W: FnOnce(TaskContext) -> F + Send + 'static,
        F: Future<Output = Result<Value, McplexError>> + Send + 'static,
    {
        let task = self.store.create(&metadata, None).await?;
        let task_id = task.task_id.clone();
        let token = CancellationToken::new();
        self.running
            .lock()
            .expect("running lock poisoned")
            .insert(task_id.clone(), token.clone());

        let ctx = TaskContext::new(
            task_id.clone(),
            self.store(),
            self.queue(),
            peer,
            self.max_queue_size,
            token.clone(),
        );

        let host = Arc::clone(self);
        tokio::spawn(async move {
            let work_future = work(ctx.clone());
            let outcome = tokio::select! {
                () = token.cancelled() => None,
                result = work_future => Some(result),
            };

            let already_terminal = matches!(
                host.store.get(&task_id).await,
                Ok(Some(task)) if task.status.is_terminal()
            );
            if !already_terminal {
                let ended = match outcome {
                    Some(Ok(value)) => ctx.complete(value).await,
                    Some(Err(error)) => {
                        debug!(%task_id, error = %error, "task work failed");
                        ctx.fail(error.to_string()).await
                    }
                    None => ctx.cancel_task(None).await,
                };
                if let Err(error) = ended {
                    warn!(%task_id, error = %error, "failed to finalize task");
                }
            }
            host.running
                .lock()
                .expect("running lock poisoned")
                .remove(&task_id);
        });

        let meta = model_immediate_response.map(|value| {
            let mut map = Map::new();
            map.insert(meta::MODEL_IMMEDIATE_RESPONSE.to_string(), value);
            map
        });
        Ok(CreateTaskResult { task, meta })
    }

    fn parse_task_params(params: Option<Value>) -> Result<GetTaskParams, McplexError> {
        match params {
            Some(params) => serde_json::from_value(params)
                .map_err(|e| McplexError::invalid_params(format!("invalid task params: {e}"))),
            None => Err(McplexError::invalid_params("missing task params")),
        }
    }

    async fn require_task(&self, id: &TaskId) -> Result<Task, McplexError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| McplexError::invalid_params("Task not found"))
    }

    async fn handle_get(&self, params: Option<Value>) -> Result<Value, McplexError> {
        let params = Self::parse_task_params(params)?;
        let task = self.require_task(&params.task_id).await?;
        Ok(serde_json::to_value(task)?)
    }

    async fn handle_list(&self, params: Option<Value>) -> Result<Value, McplexError> {
        let params: ListTasksParams = match params {
            Some(params) => serde_json::from_value(params)
                .map_err(|e| McplexError::invalid_params(format!("invalid list params: {e}")))?,
            None => ListTasksParams::default(),
        };
        let (tasks, next_cursor) = self.store.list(params.cursor.as_deref()).await?;
        Ok(serde_json::to_value(ListTasksResult { tasks, next_cursor })?)
    }

    async fn handle_cancel(
        &self,
        peer: PeerHandle,
        params: Option<Value>,
    ) -> Result<Value, McplexError> {
        let params = Self::parse_task_params(params)?;
        let task_id = params.task_id;
        let task = self.require_task(&task_id).await?;
        if task.status.is_terminal() {
            return Err(McplexError::TerminalTransitionRefused {
                task_id: task_id.as_str().to_string(),
                status: task.status.to_string(),
            });
        }

        // Abort the worker first so it cannot race new side-channel sends.
        if let Some(token) = self
            .running
            .lock()
            .expect("running lock poisoned")
            .get(&task_id)
        {
            token.cancel();
        }

        let task = self
            .store
            .update(&task_id, Some(TaskStatus::Cancelled), None)
            .await?;
        for entry in self.queue.drain(&task_id).await {
            if let Some(resolver) = entry.resolver {
                resolver.reject(McplexError::request_cancelled(
                    entry.message.method().unwrap_or("queued request"),
                ));
            }
        }
        emit_status(&peer, &task).await;
        Ok(serde_json::to_value(task)?)
    }

    /// The `tasks/result` long-poll.
    ///
    /// Relays queued side-channel messages in FIFO order through the
    /// enclosing request context, then either returns the wrapped terminal
    /// result or parks on the task's update signal and repeats.
    async fn handle_result(
        &self,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> Result<Value, McplexError> {
        let params = Self::parse_task_params(params)?;
        let task_id = params.task_id;

        loop {
            // Observe the epoch before inspecting state so an update
            // landing mid-iteration wakes the wait immediately.
            let epoch = self.store.change_epoch(&task_id).await;

            let task = self.require_task(&task_id).await?;

            while let Some(entry) = self.queue.dequeue(&task_id).await {
                ctx.send_related(entry.message).await?;
            }

            if task.status.is_terminal() {
                let stored = self.store.get_result(&task_id).await?;
                return Ok(wrap_task_result(stored, &task_id));
            }

            self.store.wait_for_update(&task_id, epoch).await;
        }
    }
}

/// Wrap a stored result for the `tasks/result` response: the original
/// payload flattened in, plus the related-task `_meta` key.
fn wrap_task_result(stored: Option<Value>, task_id: &TaskId) -> Value {
    let mut object = match stored {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
        None => Map::new(),
    };

    let related = meta::related_task_meta(task_id.as_str());
    match object.get_mut("_meta").and_then(Value::as_object_mut) {
        Some(existing) => existing.extend(related),
        None => {
            object.insert("_meta".to_string(), Value::Object(related));
        }
    }
    Value::Object(object)
}

async fn emit_status(peer: &PeerHandle, task: &Task) {
    let Ok(Value::Object(mut params)) = serde_json::to_value(task) else {
        return;
    };
    params.insert(
        "_meta".to_string(),
        Value::Object(meta::related_task_meta(task.task_id.as_str())),
    );
    if let Err(e) = peer
        .notify(methods::NOTIFICATION_TASK_STATUS, Some(Value::Object(params)))
        .await
    {
        debug!(task_id = %task.task_id, error = %e, "failed to send task status notification");
    }
}
