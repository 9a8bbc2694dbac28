//! Per-task FIFO side channel.
//!
//! While a task runs, the handler can queue messages for the requesting
//! peer: requests (elicitation, sampling), notifications, and responses.
//! The `tasks/result` poll drains the FIFO in order and relays each entry
//! to the polling client. A queued request may carry a [`Resolver`]; the
//! eventual reply is routed back through
//! [`take_resolver`](TaskMessageQueue::take_resolver) by the response
//! router.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_lock::Mutex;
use serde_json::Value;

use mcplex_core::protocol::{Message, Notification, Request, RequestId, Response};
use mcplex_core::types::TaskId;
use mcplex_core::McplexError;

use crate::resolver::Resolver;
use crate::signal::TaskSignals;

/// An entry in a task's FIFO side channel.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// The message to relay to the polling peer.
    pub message: Message,
    /// When the entry was queued.
    pub queued_at: chrono::DateTime<chrono::Utc>,
    /// Resolver for the reply, when the entry is a request expecting one.
    pub resolver: Option<Resolver<Value>>,
    /// The id used to route the reply back to the resolver.
    pub original_request_id: Option<RequestId>,
}

impl QueuedMessage {
    /// Queue a plain notification.
    #[must_use]
    pub fn notification(notification: Notification) -> Self {
        Self {
            message: Message::Notification(notification),
            queued_at: chrono::Utc::now(),
            resolver: None,
            original_request_id: None,
        }
    }

    /// Queue a request without reply routing.
    #[must_use]
    pub fn request(request: Request) -> Self {
        Self {
            message: Message::Request(request),
            queued_at: chrono::Utc::now(),
            resolver: None,
            original_request_id: None,
        }
    }

    /// Queue a request whose reply resolves `resolver`.
    #[must_use]
    pub fn request_with_resolver(request: Request, resolver: Resolver<Value>) -> Self {
        let id = request.id.clone();
        Self {
            message: Message::Request(request),
            queued_at: chrono::Utc::now(),
            resolver: Some(resolver),
            original_request_id: Some(id),
        }
    }

    /// Queue a response (success or error).
    #[must_use]
    pub fn response(response: Response) -> Self {
        Self {
            message: Message::Response(response),
            queued_at: chrono::Utc::now(),
            resolver: None,
            original_request_id: None,
        }
    }
}

#[derive(Default)]
struct QueueState {
    queues: HashMap<TaskId, VecDeque<QueuedMessage>>,
    resolvers: HashMap<RequestId, Resolver<Value>>,
}

/// Per-task FIFO queues plus the resolver table.
pub struct TaskMessageQueue {
    state: Mutex<QueueState>,
    signals: Arc<TaskSignals>,
}

impl TaskMessageQueue {
    /// Create a queue sharing a signal registry with the task store.
    #[must_use]
    pub fn new(signals: Arc<TaskSignals>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            signals,
        }
    }

    /// Append an entry, enforcing the optional bound.
    ///
    /// Indexes the entry's resolver (if any) under its original request id
    /// and wakes the task's waiters.
    pub async fn enqueue(
        &self,
        task_id: &TaskId,
        message: QueuedMessage,
        max_size: Option<usize>,
    ) -> Result<(), McplexError> {
        {
            let mut state = self.state.lock().await;
            let queue = state.queues.entry(task_id.clone()).or_default();
            if let Some(max) = max_size {
                if queue.len() >= max {
                    return Err(McplexError::QueueOverflow {
                        task_id: task_id.as_str().to_string(),
                        capacity: max,
                    });
                }
            }
            queue.push_back(message.clone());
            if let (Some(resolver), Some(id)) = (message.resolver, message.original_request_id) {
                state.resolvers.insert(id, resolver);
            }
        }
        self.signals.notify(task_id);
        Ok(())
    }

    /// Pop the oldest entry for a task.
    pub async fn dequeue(&self, task_id: &TaskId) -> Option<QueuedMessage> {
        let mut state = self.state.lock().await;
        state.queues.get_mut(task_id)?.pop_front()
    }

    /// Pop the oldest entry that carries a resolver, leaving entries
    /// without one in place.
    pub async fn dequeue_with_resolver(&self, task_id: &TaskId) -> Option<QueuedMessage> {
        let mut state = self.state.lock().await;
        let queue = state.queues.get_mut(task_id)?;
        let index = queue.iter().position(|entry| entry.resolver.is_some())?;
        queue.remove(index)
    }

    /// Remove and return all queued entries for a task, dropping their
    /// resolver index entries.
    ///
    /// Used on task cancellation and failure; the caller decides whether
    /// to reject the returned resolvers.
    pub async fn drain(&self, task_id: &TaskId) -> Vec<QueuedMessage> {
        let mut state = self.state.lock().await;
        let Some(queue) = state.queues.remove(task_id) else {
            return Vec::new();
        };
        let entries: Vec<QueuedMessage> = queue.into_iter().collect();
        for entry in &entries {
            if let Some(id) = &entry.original_request_id {
                state.resolvers.remove(id);
            }
        }
        entries
    }

    /// Remove and return the resolver indexed under a request id.
    pub async fn take_resolver(&self, request_id: &RequestId) -> Option<Resolver<Value>> {
        let mut state = self.state.lock().await;
        state.resolvers.remove(request_id)
    }

    /// The task's current queue epoch, observed before inspecting state.
    #[must_use]
    pub fn message_epoch(&self, task_id: &TaskId) -> u64 {
        self.signals.epoch(task_id)
    }

    /// Wait until a message lands after the observed epoch.
    pub async fn wait_for_message(&self, task_id: &TaskId, seen_epoch: u64) {
        self.signals.wait_since(task_id, seen_epoch).await;
    }

    /// Wake all waiters on a task's queue.
    pub fn notify_message_available(&self, task_id: &TaskId) {
        self.signals.notify(task_id);
    }

    /// Number of queued entries for a task (test support).
    pub async fn len(&self, task_id: &TaskId) -> usize {
        let state = self.state.lock().await;
        state.queues.get(task_id).map_or(0, VecDeque::len)
    }

    /// Whether a task's queue is empty.
    pub async fn is_empty(&self, task_id: &TaskId) -> bool {
        self.len(task_id).await == 0
    }
}
