//! Task persistence.
//!
//! The [`TaskStore`] contract is pluggable; the in-memory implementation is
//! the default and doubles as the reference for the semantics: terminal
//! statuses are immutable, `last_updated_at` is monotone, expiry is lazy,
//! and update waits are cancellable per waiter.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_lock::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use mcplex_core::types::{Task, TaskId, TaskMetadata, TaskStatus};
use mcplex_core::McplexError;
use mcplex_session::handler::BoxFuture;

use crate::signal::TaskSignals;

/// Page size for `tasks/list`.
const LIST_PAGE_SIZE: usize = 50;

/// Pluggable persistence for task records and results.
///
/// Implementations must uphold:
///
/// - a terminal status never changes (`TerminalTransitionRefused`)
/// - `last_updated_at` is monotone non-decreasing
/// - records whose TTL elapsed after reaching a terminal status are
///   removed lazily on any access
/// - `wait_for_update` completes on status changes, stored results, and
///   queued side-channel messages (shared signal registry), and each
///   waiter is cancellable without affecting the others
pub trait TaskStore: Send + Sync {
    /// Create a task in status `working`, generating an id when not
    /// supplied. Fails when the id collides.
    fn create<'a>(
        &'a self,
        metadata: &'a TaskMetadata,
        id: Option<TaskId>,
    ) -> BoxFuture<'a, Result<Task, McplexError>>;

    /// Fetch a task snapshot.
    fn get<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, Result<Option<Task>, McplexError>>;

    /// Update status and/or status message.
    fn update<'a>(
        &'a self,
        id: &'a TaskId,
        status: Option<TaskStatus>,
        status_message: Option<String>,
    ) -> BoxFuture<'a, Result<Task, McplexError>>;

    /// Store the task's result payload.
    fn store_result<'a>(
        &'a self,
        id: &'a TaskId,
        result: Value,
    ) -> BoxFuture<'a, Result<(), McplexError>>;

    /// Fetch the task's stored result, if any.
    fn get_result<'a>(
        &'a self,
        id: &'a TaskId,
    ) -> BoxFuture<'a, Result<Option<Value>, McplexError>>;

    /// List tasks, deterministically ordered by id, with cursor
    /// pagination.
    fn list<'a>(
        &'a self,
        cursor: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(Vec<Task>, Option<String>), McplexError>>;

    /// Delete a task record. Returns whether it existed.
    fn delete<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, Result<bool, McplexError>>;

    /// The task's current update epoch, observed before inspecting state.
    fn change_epoch<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, u64>;

    /// Wait until an update lands after the observed epoch.
    fn wait_for_update<'a>(&'a self, id: &'a TaskId, seen_epoch: u64) -> BoxFuture<'a, ()>;

    /// Wake all waiters on a task.
    fn notify_update<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, ()>;
}

struct TaskRecord {
    task: Task,
    result: Option<Value>,
    expires_at: Option<Instant>,
}

/// In-memory [`TaskStore`].
pub struct InMemoryTaskStore {
    // BTreeMap keeps list() ordering deterministic by id.
    records: Mutex<BTreeMap<String, TaskRecord>>,
    signals: Arc<TaskSignals>,
}

impl InMemoryTaskStore {
    /// Create a store with its own signal registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_signals(Arc::new(TaskSignals::new()))
    }

    /// Create a store sharing a signal registry with a message queue.
    #[must_use]
    pub fn with_signals(signals: Arc<TaskSignals>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            signals,
        }
    }

    /// The signal registry backing update waits.
    #[must_use]
    pub fn signals(&self) -> Arc<TaskSignals> {
        Arc::clone(&self.signals)
    }

    fn prune(records: &mut BTreeMap<String, TaskRecord>, signals: &TaskSignals) {
        let now = Instant::now();
        let expired: Vec<String> = records
            .iter()
            .filter(|(_, record)| record.expires_at.is_some_and(|at| at <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            debug!(task_id = %id, "expiring task record");
            records.remove(&id);
            signals.remove(&TaskId::from(id));
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn create<'a>(
        &'a self,
        metadata: &'a TaskMetadata,
        id: Option<TaskId>,
    ) -> BoxFuture<'a, Result<Task, McplexError>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            Self::prune(&mut records, &self.signals);

            let id = id.unwrap_or_else(TaskId::generate);
            if records.contains_key(id.as_str()) {
                return Err(McplexError::invalid_params(format!(
                    "task id already exists: {id}"
                )));
            }
            let task = Task::new(id.clone(), metadata);
            records.insert(
                id.as_str().to_string(),
                TaskRecord {
                    task: task.clone(),
                    result: None,
                    expires_at: None,
                },
            );
            Ok(task)
        })
    }

    fn get<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, Result<Option<Task>, McplexError>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            Self::prune(&mut records, &self.signals);
            Ok(records.get(id.as_str()).map(|record| record.task.clone()))
        })
    }

    fn update<'a>(
        &'a self,
        id: &'a TaskId,
        status: Option<TaskStatus>,
        status_message: Option<String>,
    ) -> BoxFuture<'a, Result<Task, McplexError>> {
        Box::pin(async move {
            let task = {
                let mut records = self.records.lock().await;
                Self::prune(&mut records, &self.signals);

                let record = records
                    .get_mut(id.as_str())
                    .ok_or_else(|| McplexError::task_not_found(id.as_str()))?;

                if let Some(new_status) = status {
                    if record.task.status.is_terminal() && new_status != record.task.status {
                        return Err(McplexError::TerminalTransitionRefused {
                            task_id: id.as_str().to_string(),
                            status: record.task.status.to_string(),
                        });
                    }
                    record.task.status = new_status;
                    if new_status.is_terminal() {
                        if let Some(ttl) = record.task.ttl {
                            record.expires_at =
                                Some(Instant::now() + Duration::from_millis(ttl));
                        }
                    }
                }
                if let Some(message) = status_message {
                    record.task.status_message = Some(message);
                }
                let now = chrono::Utc::now();
                if now > record.task.last_updated_at {
                    record.task.last_updated_at = now;
                }
                record.task.clone()
            };
            self.signals.notify(id);
            Ok(task)
        })
    }

    fn store_result<'a>(
        &'a self,
        id: &'a TaskId,
        result: Value,
    ) -> BoxFuture<'a, Result<(), McplexError>> {
        Box::pin(async move {
            {
                let mut records = self.records.lock().await;
                Self::prune(&mut records, &self.signals);
                let record = records
                    .get_mut(id.as_str())
                    .ok_or_else(|| McplexError::task_not_found(id.as_str()))?;
                record.result = Some(result);
            }
            self.signals.notify(id);
            Ok(())
        })
    }

    fn get_result<'a>(
        &'a self,
        id: &'a TaskId,
    ) -> BoxFuture<'a, Result<Option<Value>, McplexError>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            Self::prune(&mut records, &self.signals);
            Ok(records.get(id.as_str()).and_then(|r| r.result.clone()))
        })
    }

    fn list<'a>(
        &'a self,
        cursor: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(Vec<Task>, Option<String>), McplexError>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            Self::prune(&mut records, &self.signals);

            let page: Vec<Task> = records
                .range(cursor.map_or_else(String::new, |c| format!("{c}\u{0}"))..)
                .take(LIST_PAGE_SIZE)
                .map(|(_, record)| record.task.clone())
                .collect();
            let next_cursor = (page.len() == LIST_PAGE_SIZE)
                .then(|| page.last().map(|t| t.task_id.as_str().to_string()))
                .flatten();
            Ok((page, next_cursor))
        })
    }

    fn delete<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, Result<bool, McplexError>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            Self::prune(&mut records, &self.signals);
            let existed = records.remove(id.as_str()).is_some();
            if existed {
                self.signals.remove(id);
            }
            Ok(existed)
        })
    }

    fn change_epoch<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, u64> {
        Box::pin(async move { self.signals.epoch(id) })
    }

    fn wait_for_update<'a>(&'a self, id: &'a TaskId, seen_epoch: u64) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.signals.wait_since(id, seen_epoch).await })
    }

    fn notify_update<'a>(&'a self, id: &'a TaskId) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.signals.notify(id) })
    }
}
