//! JSON-RPC 2.0 message shapes used by the session runtime.
//!
//! Every frame on the wire is one of: a request (method call expecting a
//! response), a response (success or error, never both), a notification
//! (one-way), or a batch (non-empty array of requests and notifications).
//!
//! # Example
//!
//! ```rust
//! use mcplex_core::protocol::{Request, Response, RequestId};
//!
//! let request = Request::new("ping", RequestId::Number(1));
//!
//! let json = r#"{"jsonrpc": "2.0", "id": 1, "result": {}}"#;
//! let response: Response = serde_json::from_str(json).unwrap();
//! assert!(response.is_success());
//! ```

use crate::error::JsonRpcError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// The JSON-RPC version string. Always "2.0".
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request ID.
///
/// Request IDs correlate requests with their responses. They can be either
/// numbers or strings per the JSON-RPC 2.0 specification, and are unique per
/// session per originator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID (most common).
    Number(i64),
    /// String request ID.
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A progress token labelling `notifications/progress` frames.
///
/// Tokens are chosen by the party *making* a request and embedded in
/// `params._meta.progressToken`. They are per-session scoped and opaque to
/// the receiver. The default mapping reuses the request id as the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// Numeric progress token.
    Number(i64),
    /// String progress token.
    String(String),
}

impl From<&RequestId> for ProgressToken {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::Number(n) => Self::Number(*n),
            RequestId::String(s) => Self::String(s.clone()),
        }
    }
}

impl From<i64> for ProgressToken {
    fn from(token: i64) -> Self {
        Self::Number(token)
    }
}

impl From<&str> for ProgressToken {
    fn from(token: &str) -> Self {
        Self::String(token.to_string())
    }
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The JSON-RPC version. Always "2.0".
    pub jsonrpc: Cow<'static, str>,
    /// The request ID for correlation.
    pub id: RequestId,
    /// The method to invoke.
    pub method: Cow<'static, str>,
    /// The method parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a new request with no parameters.
    #[must_use]
    pub fn new(method: impl Into<Cow<'static, str>>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Create a new request with parameters.
    #[must_use]
    pub fn with_params(
        method: impl Into<Cow<'static, str>>,
        id: impl Into<RequestId>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Get the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// A JSON-RPC 2.0 response message.
///
/// Contains either a result (on success) or an error (on failure), never
/// both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The JSON-RPC version. Always "2.0".
    pub jsonrpc: Cow<'static, str>,
    /// The request ID this response corresponds to.
    pub id: RequestId,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl Response {
    /// Create a successful response.
    #[must_use]
    pub fn success(id: impl Into<RequestId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    #[must_use]
    pub fn error(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Check if this response indicates success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// Check if this response indicates an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Get the result, consuming self.
    ///
    /// Returns `Err` if this was an error response.
    pub fn into_result(self) -> Result<serde_json::Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            self.result.ok_or_else(|| {
                JsonRpcError::internal_error("Response contained neither result nor error")
            })
        }
    }
}

/// A JSON-RPC 2.0 notification message.
///
/// Notifications are one-way and carry no ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// The JSON-RPC version. Always "2.0".
    pub jsonrpc: Cow<'static, str>,
    /// The notification method.
    pub method: Cow<'static, str>,
    /// The notification parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    /// Create a new notification with no parameters.
    #[must_use]
    pub fn new(method: impl Into<Cow<'static, str>>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            method: method.into(),
            params: None,
        }
    }

    /// Create a new notification with parameters.
    #[must_use]
    pub fn with_params(method: impl Into<Cow<'static, str>>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Get the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// A single JSON-RPC 2.0 message (request, response, or notification).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// A request message.
    Request(Request),
    /// A notification message.
    Notification(Notification),
    /// A response message.
    Response(Response),
}

impl Message {
    /// Get the method name if this is a request or notification.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// Get the request ID if this is a request or response.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Notification(_) => None,
        }
    }

    /// Check if this is a request.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// Check if this is a response.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Check if this is a notification.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Self::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

impl From<Notification> for Message {
    fn from(n: Notification) -> Self {
        Self::Notification(n)
    }
}

/// A complete wire frame: a single message or a batch.
///
/// A batch is a non-empty array of requests and/or notifications; responses
/// to a batch are themselves an array containing entries only for the
/// batch's requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// A single message.
    Single(Message),
    /// A batch of messages.
    Batch(Vec<Message>),
}

impl Frame {
    /// Iterate over all messages in this frame.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        match self {
            Self::Single(m) => std::slice::from_ref(m).iter(),
            Self::Batch(v) => v.iter(),
        }
    }

    /// Consume the frame, producing its messages.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Single(m) => vec![m],
            Self::Batch(v) => v,
        }
    }
}

impl From<Message> for Frame {
    fn from(m: Message) -> Self {
        Self::Single(m)
    }
}

impl From<Request> for Frame {
    fn from(r: Request) -> Self {
        Self::Single(Message::Request(r))
    }
}

impl From<Response> for Frame {
    fn from(r: Response) -> Self {
        Self::Single(Message::Response(r))
    }
}

impl From<Notification> for Frame {
    fn from(n: Notification) -> Self {
        Self::Single(Message::Notification(n))
    }
}

/// A cursor for paginated results.
///
/// Cursors are opaque strings representing a position in a paginated result
/// set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = Request::new("tasks/list", 1);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tasks/list\""));
        assert!(json.contains("\"id\":1"));
    }

    #[test]
    fn test_response_success() {
        let response = Response::success(1, serde_json::json!({"ok": true}));
        assert!(response.is_success());
        assert!(!response.is_error());

        let result = response.into_result().unwrap();
        assert!(result.get("ok").is_some());
    }

    #[test]
    fn test_response_error() {
        let error = JsonRpcError::method_not_found("Method not found");
        let response = Response::error(1, error);
        assert!(!response.is_success());

        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn test_notification_has_no_id() {
        let notification = Notification::with_params(
            "notifications/progress",
            serde_json::json!({"progressToken": "p", "progress": 50}),
        );
        let json = serde_json::to_string(&notification).unwrap();
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_message_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some("ping"));

        let json = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.is_response());

        let json = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.is_notification());
    }

    #[test]
    fn test_request_id_types() {
        let request = Request::new("ping", 42);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"id\":42"));

        let request = Request::new("ping", "req-001");
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"id\":\"req-001\""));
    }

    #[test]
    fn test_progress_token_from_request_id() {
        let token = ProgressToken::from(&RequestId::Number(7));
        assert_eq!(token, ProgressToken::Number(7));

        let token = ProgressToken::from(&RequestId::String("r".into()));
        assert_eq!(token, ProgressToken::String("r".into()));
    }

    #[test]
    fn test_batch_frame_roundtrip() {
        let frame = Frame::Batch(vec![
            Message::Request(Request::new("a", 1)),
            Message::Notification(Notification::new("b")),
        ]);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.starts_with('['));

        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.messages().count(), 2);
    }
}
