//! Task types for task-augmented requests.
//!
//! A task is a persistent record representing work that continues past the
//! initiating request. A task-augmented request answers immediately with a
//! [`CreateTaskResult`]; the actual payload is fetched later through
//! `tasks/result`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a task ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random task ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The current status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task is actively making progress.
    Working,
    /// The task is blocked waiting for input from the requesting side.
    InputRequired,
    /// The task completed successfully.
    Completed,
    /// The task failed.
    Failed,
    /// The task was cancelled.
    Cancelled,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    ///
    /// Once terminal, a task's status never changes.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::InputRequired => write!(f, "input_required"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The metadata marker that makes a request task-augmented.
///
/// Carried in `params._meta.task` of the originating request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Requested retention of the task record after it reaches a terminal
    /// status, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// Full state of a task as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub task_id: TaskId,
    /// Current task status.
    pub status: TaskStatus,
    /// Human-readable status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Retention of the record after a terminal status, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Suggested polling interval, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
    /// When the task was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the task was last updated. Monotone non-decreasing.
    pub last_updated_at: chrono::DateTime<chrono::Utc>,
}

impl Task {
    /// Create a new task in status `working`.
    #[must_use]
    pub fn new(task_id: TaskId, metadata: &TaskMetadata) -> Self {
        let now = chrono::Utc::now();
        Self {
            task_id,
            status: TaskStatus::Working,
            status_message: None,
            ttl: metadata.ttl,
            poll_interval: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Set the suggested polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, millis: u64) -> Self {
        self.poll_interval = Some(millis);
        self
    }
}

/// The immediate response to a task-augmented request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskResult {
    /// The created task.
    pub task: Task,
    /// Response metadata, e.g. a model immediate response.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl CreateTaskResult {
    /// Wrap a task with no metadata.
    #[must_use]
    pub fn new(task: Task) -> Self {
        Self { task, meta: None }
    }
}

/// Parameters of `tasks/get`, `tasks/cancel`, and `tasks/result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTaskParams {
    /// The target task.
    pub task_id: TaskId,
}

/// Parameters of `tasks/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTasksParams {
    /// Cursor from a previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Result of `tasks/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResult {
    /// The page of tasks, ordered deterministically by id.
    pub tasks: Vec<Task>,
    /// Cursor for the next page, if any.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_status_wire_form() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InputRequired).unwrap(),
            json!("input_required")
        );
        assert_eq!(
            serde_json::to_value(TaskStatus::Working).unwrap(),
            json!("working")
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Working.is_terminal());
        assert!(!TaskStatus::InputRequired.is_terminal());
    }

    #[test]
    fn test_task_wire_form() {
        let task = Task::new(TaskId::new("abc"), &TaskMetadata { ttl: Some(60_000) });
        let wire = serde_json::to_value(&task).unwrap();
        assert_eq!(wire["taskId"], json!("abc"));
        assert_eq!(wire["status"], json!("working"));
        assert_eq!(wire["ttl"], json!(60_000));
        assert!(wire.get("statusMessage").is_none());
        assert!(wire.get("createdAt").is_some());
    }

    #[test]
    fn test_create_task_result_shape() {
        let task = Task::new(TaskId::new("abc"), &TaskMetadata::default());
        let result = CreateTaskResult::new(task);
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["task"]["taskId"], json!("abc"));
        assert!(crate::meta::is_create_task_result(&wire));
    }

    #[test]
    fn test_task_metadata_parsing() {
        let meta: TaskMetadata = serde_json::from_value(json!({"ttl": 1000})).unwrap();
        assert_eq!(meta.ttl, Some(1000));

        let meta: TaskMetadata = serde_json::from_value(json!({})).unwrap();
        assert_eq!(meta.ttl, None);
    }
}
