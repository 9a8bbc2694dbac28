//! The pending-request registry.
//!
//! One registry per session holds every outgoing request from send-time
//! until the first of: response delivered, error delivered, cancelled, or
//! transport closed. It also owns the progress plumbing: token → callback,
//! token → timeout controller, request id → token, and task id → token for
//! tokens that outlive their request because the response introduced a
//! task.
//!
//! All mutations are point operations behind one async mutex; nothing
//! suspends while the lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use async_lock::Mutex;
use futures::channel::oneshot;
use serde_json::Value;
use tracing::{debug, trace, warn};

use mcplex_core::meta;
use mcplex_core::protocol::{ProgressToken, RequestId};
use mcplex_core::types::{ProgressParams, TaskId};
use mcplex_core::McplexError;

use crate::timeout::TimeoutController;

/// Callback invoked for each progress notification matching a token.
pub type ProgressCallback = Arc<dyn Fn(ProgressParams) + Send + Sync>;

/// One-shot slot for an outgoing request's outcome.
pub(crate) type ResponseSender = oneshot::Sender<Result<Value, McplexError>>;
pub(crate) type ResponseReceiver = oneshot::Receiver<Result<Value, McplexError>>;

struct PendingEntry {
    sender: ResponseSender,
    method: String,
    progress_token: Option<ProgressToken>,
}

#[derive(Default)]
struct RegistryState {
    pending: HashMap<RequestId, PendingEntry>,
    progress_callbacks: HashMap<ProgressToken, ProgressCallback>,
    timeout_controllers: HashMap<ProgressToken, Arc<TimeoutController>>,
    request_progress_tokens: HashMap<RequestId, ProgressToken>,
    task_progress_tokens: HashMap<TaskId, ProgressToken>,
}

/// Registry of in-flight outgoing requests and their progress state.
#[derive(Default)]
pub struct PendingRegistry {
    state: Mutex<RegistryState>,
}

impl PendingRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outgoing request.
    ///
    /// Fails with [`McplexError::DuplicateRequestId`] when `id` is already
    /// pending.
    pub(crate) async fn register(
        &self,
        id: RequestId,
        method: &str,
        progress_token: Option<ProgressToken>,
        callback: Option<ProgressCallback>,
        controller: Option<Arc<TimeoutController>>,
    ) -> Result<ResponseReceiver, McplexError> {
        let mut state = self.state.lock().await;
        if state.pending.contains_key(&id) {
            return Err(McplexError::DuplicateRequestId { id });
        }

        let (sender, receiver) = oneshot::channel();
        if let Some(token) = &progress_token {
            state
                .request_progress_tokens
                .insert(id.clone(), token.clone());
            if let Some(callback) = callback {
                state.progress_callbacks.insert(token.clone(), callback);
            }
            if let Some(controller) = controller {
                state.timeout_controllers.insert(token.clone(), controller);
            }
        }
        state.pending.insert(
            id.clone(),
            PendingEntry {
                sender,
                method: method.to_string(),
                progress_token,
            },
        );
        trace!(%id, method, "registered pending request");
        Ok(receiver)
    }

    /// Deliver a response outcome to the request's awaiter.
    ///
    /// When the outcome is a `CreateTaskResult`, the progress token
    /// migrates from the per-request table to the per-task table inside the
    /// same critical section, before the awaiter is released; a progress
    /// notification arriving in that window is never lost.
    ///
    /// Returns `false` when no matching request was pending.
    pub(crate) async fn complete(&self, id: &RequestId, outcome: Result<Value, McplexError>) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.pending.remove(id) else {
            return false;
        };

        let migrated_task = outcome
            .as_ref()
            .ok()
            .and_then(|value| meta::create_task_id(value))
            .map(TaskId::from);

        if let Some(token) = state.request_progress_tokens.remove(id) {
            if let Some(task_id) = migrated_task {
                debug!(%id, %task_id, "migrating progress token to task scope");
                state.task_progress_tokens.insert(task_id, token);
            } else {
                state.progress_callbacks.remove(&token);
                state.timeout_controllers.remove(&token);
            }
        }

        if entry.sender.send(outcome).is_err() {
            debug!(%id, method = %entry.method, "request awaiter dropped before completion");
        }
        true
    }

    /// Deliver a progress notification to its callback, resetting any
    /// timeout controller keyed by the same token.
    pub(crate) async fn on_progress(&self, params: ProgressParams) {
        let (callback, controller) = {
            let state = self.state.lock().await;
            (
                state.progress_callbacks.get(&params.progress_token).cloned(),
                state
                    .timeout_controllers
                    .get(&params.progress_token)
                    .cloned(),
            )
        };

        if let Some(controller) = controller {
            controller.signal_progress();
        }
        if let Some(callback) = callback {
            callback(params);
        } else {
            trace!(token = %params.progress_token, "progress notification without callback");
        }
    }

    /// Drop the task-scoped progress state once a task reaches a terminal
    /// status.
    pub(crate) async fn on_task_terminal(&self, task_id: &TaskId) {
        let mut state = self.state.lock().await;
        if let Some(token) = state.task_progress_tokens.remove(task_id) {
            state.progress_callbacks.remove(&token);
            state.timeout_controllers.remove(&token);
            debug!(%task_id, "dropped task-scoped progress token");
        }
    }

    /// Cancel a pending request, delivering `error` to its awaiter.
    ///
    /// Returns the request's method name when the request was pending.
    pub(crate) async fn cancel(&self, id: &RequestId, error: McplexError) -> Option<String> {
        let mut state = self.state.lock().await;
        let entry = state.pending.remove(id)?;
        if let Some(token) = state.request_progress_tokens.remove(id) {
            state.progress_callbacks.remove(&token);
            state.timeout_controllers.remove(&token);
        }
        let _ = entry.sender.send(Err(error));
        Some(entry.method)
    }

    /// Fail every pending awaiter and clear all maps.
    ///
    /// Called on disconnect; `make_error` builds one error per awaiter.
    pub(crate) async fn drain(&self, make_error: impl Fn() -> McplexError) {
        let mut state = self.state.lock().await;
        let count = state.pending.len();
        if count > 0 {
            warn!(pending = count, "draining pending requests");
        }
        for (_, entry) in state.pending.drain() {
            let _ = entry.sender.send(Err(make_error()));
        }
        state.progress_callbacks.clear();
        state.timeout_controllers.clear();
        state.request_progress_tokens.clear();
        state.task_progress_tokens.clear();
    }

    /// The progress token associated with a pending request, if any.
    pub(crate) async fn token_for(&self, id: &RequestId) -> Option<ProgressToken> {
        let state = self.state.lock().await;
        state.pending.get(id).and_then(|e| e.progress_token.clone())
    }

    /// Number of pending requests (test support).
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}
