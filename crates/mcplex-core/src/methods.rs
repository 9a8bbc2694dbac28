//! Wire-stable JSON-RPC method names.

/// Lifecycle handshake request.
pub const INITIALIZE: &str = "initialize";
/// Handshake completion notification.
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";

/// Liveness check.
pub const PING: &str = "ping";

/// Cancellation notification, params `{ requestId, reason? }`.
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
/// Progress notification, params
/// `{ progressToken, progress, total?, message? }`.
pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";

/// Fetch a task snapshot.
pub const TASKS_GET: &str = "tasks/get";
/// List tasks with cursor pagination.
pub const TASKS_LIST: &str = "tasks/list";
/// Request cancellation of a task.
pub const TASKS_CANCEL: &str = "tasks/cancel";
/// Long-poll for a task's result and queued side-channel messages.
pub const TASKS_RESULT: &str = "tasks/result";
/// Task status change notification.
pub const NOTIFICATION_TASK_STATUS: &str = "notifications/tasks/status";

/// List client roots.
pub const ROOTS_LIST: &str = "roots/list";
/// Roots changed notification.
pub const NOTIFICATION_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

/// Sampling request (with or without tools).
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";

/// Elicitation request (form or url mode).
pub const ELICITATION_CREATE: &str = "elicitation/create";
/// Completion notification for url-mode elicitation.
pub const NOTIFICATION_ELICITATION_COMPLETE: &str = "notifications/elicitation/complete";
