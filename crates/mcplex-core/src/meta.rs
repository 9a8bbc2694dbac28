//! `_meta` field keys and accessors.
//!
//! Request parameters carry runtime metadata under the reserved `_meta`
//! key: progress tokens, task augmentation markers, and task-relation
//! links. The accessors here read those fields without disturbing the
//! surrounding (schema-opaque) payload.

use crate::protocol::ProgressToken;
use serde_json::{Map, Value};

/// `_meta` key linking a message to the task it belongs to.
pub const RELATED_TASK: &str = "io.modelcontextprotocol/related-task";

/// `_meta` key carrying a model-facing immediate response for a
/// `CreateTaskResult`.
pub const MODEL_IMMEDIATE_RESPONSE: &str = "io.modelcontextprotocol/model-immediate-response";

/// `_meta` key for the progress token of a request.
pub const PROGRESS_TOKEN: &str = "progressToken";

/// `_meta` key marking a request as task-augmented.
pub const TASK: &str = "task";

/// Get the `_meta` object of a params value, if any.
#[must_use]
pub fn meta_of(params: Option<&Value>) -> Option<&Map<String, Value>> {
    params?.get("_meta")?.as_object()
}

/// Extract the progress token from request params.
#[must_use]
pub fn progress_token_of(params: Option<&Value>) -> Option<ProgressToken> {
    let token = meta_of(params)?.get(PROGRESS_TOKEN)?;
    serde_json::from_value(token.clone()).ok()
}

/// Extract the task id a message relates to from a `_meta` object.
#[must_use]
pub fn related_task_id(meta: &Map<String, Value>) -> Option<&str> {
    meta.get(RELATED_TASK)?.get("taskId")?.as_str()
}

/// Extract the related task id from request params.
#[must_use]
pub fn related_task_id_of(params: Option<&Value>) -> Option<String> {
    related_task_id(meta_of(params)?).map(str::to_string)
}

/// Build the `_meta` value `{ "io.modelcontextprotocol/related-task":
/// {"taskId": id} }`.
#[must_use]
pub fn related_task_meta(task_id: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert(
        RELATED_TASK.to_string(),
        serde_json::json!({ "taskId": task_id }),
    );
    meta
}

/// Whether a success result value is a `CreateTaskResult`.
///
/// Detection is structural: the presence of `task.taskId` inside the value.
#[must_use]
pub fn is_create_task_result(result: &Value) -> bool {
    create_task_id(result).is_some()
}

/// Extract the task id from a `CreateTaskResult`-shaped value.
#[must_use]
pub fn create_task_id(result: &Value) -> Option<&str> {
    result.get("task")?.get("taskId")?.as_str()
}
