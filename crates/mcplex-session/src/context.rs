//! Request context and peer handle.
//!
//! A [`PeerHandle`] is a cheap-clone handle to the session, used by
//! handlers (and the task subsystem) to send notifications and nested
//! requests back to the peer. A [`RequestContext`] wraps one inbound
//! request: its id, progress token, task augmentation, transport metadata,
//! and cancellation state.

use serde_json::Value;

use mcplex_core::methods;
use mcplex_core::protocol::{Message, ProgressToken, RequestId};
use mcplex_core::types::{
    CreateMessageParams, ElicitParams, ElicitResult, ListRootsResult, ProgressParams, TaskMetadata,
};
use mcplex_core::McplexError;
use mcplex_transport::MessageMeta;

use crate::cancellation::CancellationToken;
use crate::options::RequestOptions;
use crate::session::{NegotiatedPeer, SessionCore};
use std::sync::Arc;

/// A handle for talking to the remote peer of a session.
#[derive(Clone)]
pub struct PeerHandle {
    pub(crate) core: Arc<SessionCore>,
}

impl PeerHandle {
    /// Send a request to the peer and await its result.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, McplexError> {
        self.core.do_request(method, params, options).await
    }

    /// Send a notification to the peer.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McplexError> {
        self.core.notify_peer(method, params).await
    }

    /// Send a raw message associated with an inbound request id.
    ///
    /// Transports that multiplex delivery by request (Streamable HTTP) use
    /// the association to pick the stream; others ignore it.
    pub async fn send_related(
        &self,
        message: Message,
        related: &RequestId,
    ) -> Result<(), McplexError> {
        self.core.send_message(message, Some(related)).await
    }

    /// Allocate the next outgoing request id.
    #[must_use]
    pub fn next_request_id(&self) -> RequestId {
        self.core.next_request_id()
    }

    /// The negotiated peer, once the handshake completed.
    #[must_use]
    pub fn negotiated(&self) -> Option<NegotiatedPeer> {
        self.core.negotiated()
    }

    /// Whether the session currently has a live transport.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn require_capability(
        &self,
        capability: &str,
        supported: impl FnOnce(&NegotiatedPeer) -> bool,
    ) -> Result<(), McplexError> {
        let negotiated = self.negotiated().ok_or_else(|| McplexError::InvalidState {
            message: "session handshake not complete".to_string(),
        })?;
        if supported(&negotiated) {
            Ok(())
        } else {
            Err(McplexError::CapabilityNotSupported {
                capability: capability.to_string(),
            })
        }
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<(), McplexError> {
        let _: Value = self
            .request(methods::PING, None, RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Ask the peer for structured input, outside any task.
    ///
    /// For input requested from inside a running task, use the task
    /// context instead so the request rides the task's side channel.
    pub async fn elicit(&self, params: ElicitParams) -> Result<ElicitResult, McplexError> {
        if params.is_url_mode() {
            self.require_capability("elicitation.url", NegotiatedPeer::supports_url_elicitation)?;
        } else {
            self.require_capability("elicitation", NegotiatedPeer::supports_elicitation)?;
        }
        let value = self
            .request(
                methods::ELICITATION_CREATE,
                Some(serde_json::to_value(params)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the peer to sample its model, outside any task.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> Result<Value, McplexError> {
        self.require_capability("sampling", NegotiatedPeer::supports_sampling)?;
        self.request(
            methods::SAMPLING_CREATE_MESSAGE,
            Some(serde_json::to_value(params)?),
            RequestOptions::default(),
        )
        .await
    }

    /// List the peer's roots.
    pub async fn list_roots(&self) -> Result<ListRootsResult, McplexError> {
        self.require_capability("roots", NegotiatedPeer::supports_roots)?;
        let value = self
            .request(methods::ROOTS_LIST, None, RequestOptions::default())
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Context passed to inbound request handlers.
#[derive(Clone)]
pub struct RequestContext {
    /// The inbound request id.
    pub request_id: RequestId,
    /// Progress token the caller supplied, if any.
    pub progress_token: Option<ProgressToken>,
    /// Task augmentation marker from `_meta.task`, if any.
    pub task: Option<TaskMetadata>,
    /// Transport-level metadata for this message.
    pub meta: MessageMeta,
    pub(crate) peer: PeerHandle,
    pub(crate) cancel: CancellationToken,
}

impl RequestContext {
    /// The peer handle for nested requests and notifications.
    #[must_use]
    pub fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    /// Check if the request has been cancelled by the peer.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The cancellation token for this request.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Report progress for this request.
    ///
    /// Silently succeeds when the caller supplied no progress token.
    pub async fn progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<&str>,
    ) -> Result<(), McplexError> {
        let Some(token) = &self.progress_token else {
            return Ok(());
        };

        let mut params = ProgressParams::new(token.clone(), progress);
        params.total = total;
        params.message = message.map(str::to_string);
        self.peer
            .notify(
                methods::NOTIFICATION_PROGRESS,
                Some(serde_json::to_value(params)?),
            )
            .await
    }

    /// Send a raw message associated with this request.
    ///
    /// Used by the task result handler to relay queued side-channel
    /// messages to the polling client.
    pub async fn send_related(&self, message: Message) -> Result<(), McplexError> {
        self.peer.send_related(message, &self.request_id).await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("progress_token", &self.progress_token)
            .field("task", &self.task)
            .field("is_cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
