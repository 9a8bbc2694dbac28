//! The primary error type for the mcplex runtime.

use miette::Diagnostic;
use thiserror::Error;

use super::codes;
use crate::codec::CodecError;
use crate::protocol::RequestId;

/// A boxed error source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Details for a failed lifecycle handshake (boxed to keep the enum small).
#[derive(Debug)]
pub struct HandshakeDetails {
    /// Human-readable failure message.
    pub message: String,
    /// The protocol version the local side offered.
    pub offered_version: Option<String>,
    /// The protocol version the peer answered with.
    pub peer_version: Option<String>,
    /// The underlying error, if available.
    pub source: Option<BoxError>,
}

impl std::fmt::Display for HandshakeDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandshakeDetails {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as _)
    }
}

/// The unified error type for the mcplex runtime.
///
/// All errors flow through this enum. Variants map onto the JSON-RPC error
/// codes via [`McplexError::code`]; only protocol-typed variants are ever
/// forwarded to the peer verbatim — everything else is sanitized to an
/// internal error at the session boundary.
#[derive(Error, Diagnostic, Debug)]
pub enum McplexError {
    // ========================================================================
    // JSON-RPC protocol errors
    // ========================================================================
    /// Invalid JSON or a frame matching no JSON-RPC shape.
    #[error("Parse error: {message}")]
    #[diagnostic(code(mcplex::protocol::parse_error))]
    Parse {
        /// Human-readable error message.
        message: String,
        /// The underlying parse error, if available.
        #[source]
        source: Option<BoxError>,
    },

    /// The JSON sent is not a valid Request object.
    #[error("Invalid request: {message}")]
    #[diagnostic(code(mcplex::protocol::invalid_request))]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
    },

    /// The method does not exist or is not available.
    #[error("Method not found: {method}")]
    #[diagnostic(code(mcplex::protocol::method_not_found))]
    MethodNotFound {
        /// The method that was requested.
        method: String,
    },

    /// Invalid method parameters.
    #[error("Invalid params: {message}")]
    #[diagnostic(code(mcplex::protocol::invalid_params))]
    InvalidParams {
        /// Human-readable error message.
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    #[diagnostic(code(mcplex::protocol::internal_error), severity(error))]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<BoxError>,
    },

    // ========================================================================
    // Transport errors
    // ========================================================================
    /// Transport-level failure.
    #[error("Transport error: {message}")]
    #[diagnostic(code(mcplex::transport::error))]
    Transport {
        /// Human-readable error message.
        message: String,
        /// The underlying transport error, if available.
        #[source]
        source: Option<BoxError>,
    },

    /// The connection closed while requests were pending.
    #[error("Connection closed")]
    #[diagnostic(
        code(mcplex::transport::connection_closed),
        help("Reconnect the session to continue")
    )]
    ConnectionClosed,

    /// The lifecycle handshake failed (boxed to reduce enum size).
    #[error("Handshake failed: {}", .0.message)]
    #[diagnostic(code(mcplex::session::handshake_failed))]
    HandshakeFailed(#[source] Box<HandshakeDetails>),

    // ========================================================================
    // Cancellation and timeout
    // ========================================================================
    /// The local awaiter of an outbound request was cancelled.
    #[error("Request '{method}' cancelled{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    #[diagnostic(code(mcplex::request::cancelled))]
    RequestCancelled {
        /// The cancelled request's method.
        method: String,
        /// Reason for cancellation, if provided.
        reason: Option<String>,
    },

    /// An outbound request exceeded its deadline.
    #[error("Request '{method}' timed out after {elapsed:?}")]
    #[diagnostic(
        code(mcplex::request::timeout),
        help("Consider raising the timeout or enabling reset-on-progress")
    )]
    RequestTimeout {
        /// The timed-out request's method.
        method: String,
        /// How long we waited before timing out.
        elapsed: std::time::Duration,
    },

    // ========================================================================
    // Session errors
    // ========================================================================
    /// An outgoing request id collided with one already pending.
    #[error("Duplicate request id: {id}")]
    #[diagnostic(code(mcplex::session::duplicate_id))]
    DuplicateRequestId {
        /// The colliding id.
        id: RequestId,
    },

    /// The peer did not advertise a capability the operation requires.
    #[error("Capability not supported by peer: {capability}")]
    #[diagnostic(code(mcplex::session::capability_not_supported))]
    CapabilityNotSupported {
        /// The capability that was required.
        capability: String,
    },

    /// The session is not in a state that permits the operation.
    #[error("Invalid session state: {message}")]
    #[diagnostic(code(mcplex::session::invalid_state))]
    InvalidState {
        /// What went wrong.
        message: String,
    },

    // ========================================================================
    // Task errors
    // ========================================================================
    /// No task with the given id exists.
    #[error("Task not found: {task_id}")]
    #[diagnostic(code(mcplex::task::not_found))]
    TaskNotFound {
        /// The missing task id.
        task_id: String,
    },

    /// An update attempted to transition a task away from a terminal status.
    #[error("Task {task_id} is {status} and cannot change status")]
    #[diagnostic(code(mcplex::task::terminal_transition_refused))]
    TerminalTransitionRefused {
        /// The task id.
        task_id: String,
        /// The terminal status the task is in.
        status: String,
    },

    /// A per-task message queue is full.
    #[error("Message queue for task {task_id} is full (capacity {capacity})")]
    #[diagnostic(code(mcplex::task::queue_overflow))]
    QueueOverflow {
        /// The task id.
        task_id: String,
        /// The configured queue bound.
        capacity: usize,
    },

    // ========================================================================
    // Peer-reported errors
    // ========================================================================
    /// The peer answered a request with a JSON-RPC error.
    #[error("{0}")]
    #[diagnostic(code(mcplex::peer::error_response))]
    ErrorResponse(#[source] super::jsonrpc::JsonRpcError),

    /// One or more URL-mode elicitations must complete first.
    #[error("URL elicitation required")]
    #[diagnostic(code(mcplex::peer::url_elicitation_required))]
    UrlElicitationRequired {
        /// The url-elicitation parameter objects the caller must satisfy.
        elicitations: Vec<serde_json::Value>,
    },
}

// ============================================================================
// Error construction helpers
// ============================================================================

impl McplexError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a method not found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an invalid params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with a source.
    pub fn transport_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a handshake failure.
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        Self::HandshakeFailed(Box::new(HandshakeDetails {
            message: message.into(),
            offered_version: None,
            peer_version: None,
            source: None,
        }))
    }

    /// Create a handshake failure with version information.
    pub fn handshake_failed_with_versions(
        message: impl Into<String>,
        offered_version: Option<String>,
        peer_version: Option<String>,
    ) -> Self {
        Self::HandshakeFailed(Box::new(HandshakeDetails {
            message: message.into(),
            offered_version,
            peer_version,
            source: None,
        }))
    }

    /// Create a request-cancelled error.
    pub fn request_cancelled(method: impl Into<String>) -> Self {
        Self::RequestCancelled {
            method: method.into(),
            reason: None,
        }
    }

    /// Create a task-not-found error.
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    /// Create a url-elicitation-required error.
    pub fn url_elicitation_required(elicitations: Vec<serde_json::Value>) -> Self {
        Self::UrlElicitationRequired { elicitations }
    }

    /// Get the JSON-RPC error code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => codes::PARSE_ERROR,
            Self::InvalidRequest { .. } | Self::InvalidState { .. } => codes::INVALID_REQUEST,
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::InvalidParams { .. } | Self::TaskNotFound { .. } => codes::INVALID_PARAMS,
            Self::Internal { .. }
            | Self::DuplicateRequestId { .. }
            | Self::QueueOverflow { .. } => codes::INTERNAL_ERROR,
            Self::Transport { .. } | Self::ConnectionClosed | Self::HandshakeFailed(_) => {
                codes::CONNECTION_CLOSED
            }
            Self::RequestCancelled { .. } => codes::REQUEST_CANCELLED,
            Self::RequestTimeout { .. } => codes::REQUEST_TIMEOUT,
            Self::CapabilityNotSupported { .. } | Self::TerminalTransitionRefused { .. } => {
                codes::INVALID_REQUEST
            }
            Self::ErrorResponse(err) => err.code,
            Self::UrlElicitationRequired { .. } => codes::URL_ELICITATION_REQUIRED,
        }
    }

    /// Whether this error is protocol-typed and safe to forward verbatim.
    ///
    /// Non-protocol errors crossing the session boundary are replaced by a
    /// sanitized internal error; full detail is logged, never wired.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::InvalidRequest { .. }
                | Self::MethodNotFound { .. }
                | Self::InvalidParams { .. }
                | Self::CapabilityNotSupported { .. }
                | Self::TaskNotFound { .. }
                | Self::TerminalTransitionRefused { .. }
                | Self::ErrorResponse(_)
                | Self::UrlElicitationRequired { .. }
        )
    }
}

// ============================================================================
// Standard error conversions
// ============================================================================

impl From<serde_json::Error> for McplexError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: "JSON serialization/deserialization error".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<CodecError> for McplexError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedFrame { reason } => Self::parse(reason),
            CodecError::UnsupportedJsonRpcVersion { version } => {
                Self::invalid_request(format!("unsupported JSON-RPC version: {version}"))
            }
            CodecError::InvalidId => Self::invalid_request("invalid request id"),
            CodecError::EmptyBatch => Self::invalid_request("empty batch"),
        }
    }
}

impl From<super::jsonrpc::JsonRpcError> for McplexError {
    fn from(err: super::jsonrpc::JsonRpcError) -> Self {
        match err.code {
            codes::URL_ELICITATION_REQUIRED => {
                let elicitations = err
                    .data
                    .as_ref()
                    .and_then(|d| d.get("elicitations"))
                    .and_then(|e| e.as_array())
                    .cloned()
                    .unwrap_or_default();
                Self::UrlElicitationRequired { elicitations }
            }
            _ => Self::ErrorResponse(err),
        }
    }
}
