//! Session and per-request configuration.

use std::time::Duration;

use serde_json::{Map, Value};

use mcplex_core::capability::{ClientCapabilities, ServerCapabilities};
use mcplex_core::protocol::{ProgressToken, RequestId};
use mcplex_core::types::{ClientInfo, ServerInfo, TaskMetadata};

use crate::registry::ProgressCallback;

/// Which side of the protocol this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The session initiates the handshake.
    Client,
    /// The session answers the handshake.
    Server,
}

/// Default timeout applied to outbound requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a [`Session`](crate::Session).
pub struct SessionOptions {
    /// Which side of the handshake this session plays.
    pub role: Role,
    /// Identity advertised when playing the client role.
    pub client_info: ClientInfo,
    /// Identity advertised when playing the server role.
    pub server_info: ServerInfo,
    /// Explicit client capability overrides; merged field-by-field over
    /// capabilities inferred from registered handlers.
    pub client_capabilities: Option<ClientCapabilities>,
    /// Explicit server capability overrides.
    pub server_capabilities: Option<ServerCapabilities>,
    /// Usage instructions sent in the initialize result (server role).
    pub instructions: Option<String>,
    /// Reject `connect()` when a capability is advertised without a
    /// backing handler instead of logging a warning.
    pub strict_capabilities: bool,
    /// Default timeout for outbound requests. `None` disables the default.
    pub default_request_timeout: Option<Duration>,
    /// Capacity of the inbound notification queue.
    pub notification_queue_size: usize,
}

impl SessionOptions {
    /// Options for a client-role session.
    #[must_use]
    pub fn client(info: ClientInfo) -> Self {
        Self {
            role: Role::Client,
            client_info: info,
            server_info: ServerInfo::default(),
            client_capabilities: None,
            server_capabilities: None,
            instructions: None,
            strict_capabilities: false,
            default_request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            notification_queue_size: 256,
        }
    }

    /// Options for a server-role session.
    #[must_use]
    pub fn server(info: ServerInfo) -> Self {
        Self {
            role: Role::Server,
            client_info: ClientInfo::default(),
            server_info: info,
            client_capabilities: None,
            server_capabilities: None,
            instructions: None,
            strict_capabilities: false,
            default_request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            notification_queue_size: 256,
        }
    }

    /// Set explicit client capability overrides.
    #[must_use]
    pub fn with_client_capabilities(mut self, caps: ClientCapabilities) -> Self {
        self.client_capabilities = Some(caps);
        self
    }

    /// Set explicit server capability overrides.
    #[must_use]
    pub fn with_server_capabilities(mut self, caps: ServerCapabilities) -> Self {
        self.server_capabilities = Some(caps);
        self
    }

    /// Set server instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Enable strict capability validation at connect time.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict_capabilities = true;
        self
    }

    /// Override the default request timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_request_timeout = timeout;
        self
    }
}

/// Per-request options for outbound requests.
#[derive(Default, Clone)]
pub struct RequestOptions {
    /// Timeout override; `None` uses the session default.
    pub timeout: Option<Duration>,
    /// Disable the timeout entirely, ignoring the session default.
    pub no_timeout: bool,
    /// Reset the timeout clock on every progress notification for this
    /// request.
    pub reset_timeout_on_progress: bool,
    /// Upper bound on the total wait regardless of progress resets.
    pub max_total_timeout: Option<Duration>,
    /// Callback for progress notifications matching this request's token.
    pub on_progress: Option<ProgressCallback>,
    /// Explicit progress token; defaults to the request id when progress
    /// tracking is active.
    pub progress_token: Option<ProgressToken>,
    /// Extra `_meta` entries merged into the outgoing params.
    pub meta: Option<Map<String, Value>>,
    /// Mark the request task-augmented: the responder answers with a
    /// `CreateTaskResult` instead of the normal result.
    pub task: Option<TaskMetadata>,
    /// Hint for transports that multiplex delivery by request id.
    pub related_request_id: Option<RequestId>,
}

impl RequestOptions {
    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the timeout.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.no_timeout = true;
        self
    }

    /// Enable reset-on-progress with an optional total bound.
    #[must_use]
    pub fn reset_on_progress(mut self, max_total: Option<Duration>) -> Self {
        self.reset_timeout_on_progress = true;
        self.max_total_timeout = max_total;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Set an explicit progress token.
    #[must_use]
    pub fn with_progress_token(mut self, token: ProgressToken) -> Self {
        self.progress_token = Some(token);
        self
    }

    /// Merge extra `_meta` entries into the outgoing request.
    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Mark the request task-augmented.
    #[must_use]
    pub fn as_task(mut self, metadata: TaskMetadata) -> Self {
        self.task = Some(metadata);
        self
    }

    /// Set the related-request transport hint.
    #[must_use]
    pub fn related_to(mut self, id: RequestId) -> Self {
        self.related_request_id = Some(id);
        self
    }
}
