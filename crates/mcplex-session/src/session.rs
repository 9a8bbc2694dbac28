//! The session: one bidirectional connection bound to a single transport.
//!
//! A session moves through `Fresh → Connecting → Handshaking → Ready →
//! Disconnected`. Handler registration locks at `connect()`; reconnection
//! reuses the same handlers and preserves pending requests, so responses
//! match their originators even when the underlying transport changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use serde_json::{json, Value};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, trace, warn};

use mcplex_core::capability::{
    ClientCapabilities, RootsCapability, SamplingCapability, ServerCapabilities,
};
use mcplex_core::codec;
use mcplex_core::meta;
use mcplex_core::methods;
use mcplex_core::protocol::{Frame, Message, Notification, ProgressToken, Request, RequestId};
use mcplex_core::protocol_version::{negotiate, ProtocolVersion};
use mcplex_core::types::{
    CancelledParams, ClientInfo, InitializeParams, InitializeResult, ServerInfo,
};
use mcplex_core::McplexError;
use mcplex_transport::{Transport, TransportMessage};

use crate::cancellation::CancellationToken;
use crate::context::PeerHandle;
use crate::dispatch::{self, LoopCommand};
use crate::handler::{request_handler, BoxFuture, HandlerMap, NotificationHandler, RequestHandler};
use crate::options::{RequestOptions, Role, SessionOptions};
use crate::registry::PendingRegistry;
use crate::router::ResponseRouter;
use crate::timeout::{await_response, TimeoutController};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet connected. Handlers may be registered.
    Fresh,
    /// Transport connection in progress. Handlers are locked.
    Connecting,
    /// Transport up; lifecycle handshake in flight.
    Handshaking,
    /// Handshake complete; normal traffic flows.
    Ready,
    /// Terminal: the session is no longer bound to a live transport.
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fresh => "fresh",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// What the handshake established about the remote peer.
#[derive(Debug, Clone)]
pub struct NegotiatedPeer {
    /// The protocol version in use for this session.
    pub protocol_version: ProtocolVersion,
    /// The peer's capabilities when it plays the client role.
    pub client_capabilities: Option<ClientCapabilities>,
    /// The peer's identity when it plays the client role.
    pub client_info: Option<ClientInfo>,
    /// The peer's capabilities when it plays the server role.
    pub server_capabilities: Option<ServerCapabilities>,
    /// The peer's identity when it plays the server role.
    pub server_info: Option<ServerInfo>,
    /// Instructions the server supplied, if any.
    pub instructions: Option<String>,
}

impl NegotiatedPeer {
    /// Whether the peer can answer `elicitation/create` in form mode.
    #[must_use]
    pub fn supports_elicitation(&self) -> bool {
        self.client_capabilities
            .as_ref()
            .is_some_and(ClientCapabilities::has_elicitation)
    }

    /// Whether the peer can answer url-mode elicitation.
    #[must_use]
    pub fn supports_url_elicitation(&self) -> bool {
        self.client_capabilities
            .as_ref()
            .is_some_and(ClientCapabilities::has_url_elicitation)
    }

    /// Whether the peer can answer `sampling/createMessage`.
    #[must_use]
    pub fn supports_sampling(&self) -> bool {
        self.client_capabilities
            .as_ref()
            .is_some_and(ClientCapabilities::has_sampling)
    }

    /// Whether the peer can answer `roots/list`.
    #[must_use]
    pub fn supports_roots(&self) -> bool {
        self.client_capabilities
            .as_ref()
            .is_some_and(ClientCapabilities::has_roots)
    }

    /// Whether the peer accepts task-augmented requests.
    #[must_use]
    pub fn supports_tasks(&self) -> bool {
        self.client_capabilities
            .as_ref()
            .is_some_and(ClientCapabilities::has_tasks)
            || self
                .server_capabilities
                .as_ref()
                .is_some_and(ServerCapabilities::has_tasks)
    }
}

/// Object-safe transport wrapper so session internals stay non-generic.
pub(crate) trait DynTransport: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<(), McplexError>>;
    fn disconnect(&self) -> BoxFuture<'_, Result<(), McplexError>>;
    fn send<'a>(
        &'a self,
        frame: Frame,
        related: Option<&'a RequestId>,
    ) -> BoxFuture<'a, Result<(), McplexError>>;
    fn recv(&self) -> BoxFuture<'_, Result<Option<TransportMessage>, McplexError>>;
    fn set_protocol_version(&self, version: &str);
    fn is_connected(&self) -> bool;
}

struct TransportAdapter<T>(T);

impl<T: Transport + 'static> DynTransport for TransportAdapter<T> {
    fn connect(&self) -> BoxFuture<'_, Result<(), McplexError>> {
        Box::pin(async move {
            self.0
                .connect()
                .await
                .map_err(|e| McplexError::transport_with_source("connect failed", e))
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), McplexError>> {
        Box::pin(async move {
            self.0
                .disconnect()
                .await
                .map_err(|e| McplexError::transport_with_source("disconnect failed", e))
        })
    }

    fn send<'a>(
        &'a self,
        frame: Frame,
        related: Option<&'a RequestId>,
    ) -> BoxFuture<'a, Result<(), McplexError>> {
        Box::pin(async move {
            self.0
                .send(frame, related)
                .await
                .map_err(|e| McplexError::transport_with_source("send failed", e))
        })
    }

    fn recv(&self) -> BoxFuture<'_, Result<Option<TransportMessage>, McplexError>> {
        Box::pin(async move {
            self.0
                .recv()
                .await
                .map_err(|e| McplexError::transport_with_source("receive failed", e))
        })
    }

    fn set_protocol_version(&self, version: &str) {
        self.0.set_protocol_version(version);
    }

    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }
}

/// Shared state behind a [`Session`] and its [`PeerHandle`]s.
pub(crate) struct SessionCore {
    pub(crate) options: SessionOptions,
    state: StdMutex<SessionState>,
    state_changed: Notify,
    transport: StdRwLock<Option<Arc<dyn DynTransport>>>,
    pub(crate) registry: PendingRegistry,
    pub(crate) handlers: HandlerMap,
    routers: StdRwLock<Vec<Arc<dyn ResponseRouter>>>,
    in_flight: StdMutex<HashMap<RequestId, CancellationToken>>,
    next_id: AtomicI64,
    negotiated: StdMutex<Option<NegotiatedPeer>>,
    loop_ctl: StdMutex<Option<watch::Sender<LoopCommand>>>,
}

impl SessionCore {
    pub(crate) fn role(&self) -> Role {
        self.options.role
    }

    pub(crate) fn notification_queue_size(&self) -> usize {
        self.options.notification_queue_size
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        {
            let mut current = self.state.lock().expect("state lock poisoned");
            if *current == state {
                return;
            }
            trace!(from = %current, to = %state, "session state change");
            *current = state;
        }
        self.state_changed.notify_waiters();
    }

    async fn wait_ready(&self) -> Result<(), McplexError> {
        loop {
            let notified = self.state_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            match self.state() {
                SessionState::Ready => return Ok(()),
                SessionState::Disconnected => return Err(McplexError::ConnectionClosed),
                _ => {}
            }
            notified.await;
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.transport
            .read()
            .expect("transport lock poisoned")
            .as_ref()
            .is_some_and(|t| t.is_connected())
    }

    fn transport(&self) -> Result<Arc<dyn DynTransport>, McplexError> {
        self.transport
            .read()
            .expect("transport lock poisoned")
            .clone()
            .ok_or(McplexError::ConnectionClosed)
    }

    fn set_transport(&self, transport: Arc<dyn DynTransport>) {
        *self.transport.write().expect("transport lock poisoned") = Some(transport);
    }

    fn take_transport(&self) -> Option<Arc<dyn DynTransport>> {
        self.transport.write().expect("transport lock poisoned").take()
    }

    fn take_loop_ctl(&self) -> Option<watch::Sender<LoopCommand>> {
        self.loop_ctl.lock().expect("loop ctl lock poisoned").take()
    }

    pub(crate) fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn negotiated(&self) -> Option<NegotiatedPeer> {
        self.negotiated
            .lock()
            .expect("negotiated lock poisoned")
            .clone()
    }

    pub(crate) fn store_negotiated(&self, peer: NegotiatedPeer) {
        *self.negotiated.lock().expect("negotiated lock poisoned") = Some(peer);
    }

    /// Push the negotiated protocol version down to the transport.
    pub(crate) fn apply_negotiated_version(&self) {
        if let (Ok(transport), Some(negotiated)) = (self.transport(), self.negotiated()) {
            transport.set_protocol_version(negotiated.protocol_version.as_str());
        }
    }

    pub(crate) fn routers(&self) -> Vec<Arc<dyn ResponseRouter>> {
        self.routers.read().expect("router lock poisoned").clone()
    }

    pub(crate) fn add_router(&self, router: Arc<dyn ResponseRouter>) {
        self.routers
            .write()
            .expect("router lock poisoned")
            .push(router);
    }

    pub(crate) fn track_inbound(&self, id: &RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .insert(id.clone(), token.clone());
        token
    }

    pub(crate) fn untrack_inbound(&self, id: &RequestId) {
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(id);
    }

    pub(crate) fn inbound_token(&self, id: &RequestId) -> Option<CancellationToken> {
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .get(id)
            .cloned()
    }

    pub(crate) async fn send_frame(
        &self,
        frame: Frame,
        related: Option<&RequestId>,
    ) -> Result<(), McplexError> {
        self.transport()?.send(frame, related).await
    }

    pub(crate) async fn send_message(
        &self,
        message: Message,
        related: Option<&RequestId>,
    ) -> Result<(), McplexError> {
        self.send_frame(Frame::Single(message), related).await
    }

    pub(crate) async fn notify_peer(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McplexError> {
        let notification = match params {
            Some(params) => Notification::with_params(method.to_string(), params),
            None => Notification::new(method.to_string()),
        };
        self.send_message(Message::Notification(notification), None)
            .await
    }

    /// Best-effort `notifications/cancelled`; failures are logged, never
    /// surfaced.
    pub(crate) async fn send_cancelled(&self, id: &RequestId, reason: Option<String>) {
        let mut params = CancelledParams::new(id.clone());
        params.reason = reason;
        let Ok(params) = serde_json::to_value(params) else {
            return;
        };
        let notification =
            Notification::with_params(methods::NOTIFICATION_CANCELLED, params);
        if let Err(e) = self
            .send_message(Message::Notification(notification), None)
            .await
        {
            debug!(%id, error = %e, "failed to send cancellation notification");
        }
    }

    fn gate_outbound(&self, method: &str) -> Result<(), McplexError> {
        match self.state() {
            SessionState::Ready => Ok(()),
            // Liveness checks are the one request allowed mid-handshake.
            SessionState::Handshaking if method == methods::PING => Ok(()),
            state => Err(McplexError::InvalidState {
                message: format!("cannot send '{method}' while session is {state}"),
            }),
        }
    }

    /// The outbound request path: registration, `_meta` injection, send,
    /// and the await with timeout/cancellation semantics.
    pub(crate) async fn do_request(
        self: &Arc<Self>,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, McplexError> {
        self.gate_outbound(method)?;

        let id = self.next_request_id();
        let wants_progress = options.on_progress.is_some()
            || options.reset_timeout_on_progress
            || options.progress_token.is_some();
        let token = wants_progress.then(|| {
            options
                .progress_token
                .clone()
                .unwrap_or_else(|| ProgressToken::from(&id))
        });

        let mut params = params;
        let mut extra = options.meta.clone().unwrap_or_default();
        if let Some(task) = &options.task {
            extra.insert(meta::TASK.to_string(), serde_json::to_value(task)?);
        }
        codec::inject_meta(
            &mut params,
            token.as_ref(),
            (!extra.is_empty()).then_some(&extra),
        );

        let timeout = if options.no_timeout {
            None
        } else {
            options.timeout.or(self.options.default_request_timeout)
        };
        let controller = timeout.map(|base| {
            Arc::new(TimeoutController::new(
                base,
                options.reset_timeout_on_progress,
                options.max_total_timeout,
            ))
        });

        let rx = self
            .registry
            .register(
                id.clone(),
                method,
                token,
                options.on_progress.clone(),
                controller.clone(),
            )
            .await?;
        let mut guard = PendingGuard::new(Arc::clone(self), id.clone(), method);

        let request = match params {
            Some(params) => Request::with_params(method.to_string(), id.clone(), params),
            None => Request::new(method.to_string(), id.clone()),
        };
        trace!(%id, method, "sending request");

        if let Err(e) = self
            .send_frame(request.into(), options.related_request_id.as_ref())
            .await
        {
            guard.disarm();
            self.registry.cancel(&id, McplexError::ConnectionClosed).await;
            return Err(e);
        }

        let outcome = await_response(rx, controller.as_deref(), method).await;
        guard.disarm();

        match outcome {
            Err(McplexError::RequestTimeout { elapsed, .. }) => {
                self.registry
                    .cancel(&id, McplexError::request_cancelled(method))
                    .await;
                if method != methods::INITIALIZE {
                    self.send_cancelled(
                        &id,
                        Some(format!("Request timed out after {elapsed:?}")),
                    )
                    .await;
                }
                Err(McplexError::RequestTimeout {
                    method: method.to_string(),
                    elapsed,
                })
            }
            other => other,
        }
    }

    /// Cleanup when the transport stream terminates for good.
    pub(crate) async fn handle_stream_closed(&self) {
        self.registry.drain(|| McplexError::ConnectionClosed).await;
        let tokens: Vec<CancellationToken> = {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            in_flight.drain().map(|(_, token)| token).collect()
        };
        for token in &tokens {
            token.cancel();
        }
        self.set_state(SessionState::Disconnected);
    }

    fn start_loop(self: &Arc<Self>, transport: Arc<dyn DynTransport>) {
        let (tx, rx) = watch::channel(LoopCommand::Run);
        *self.loop_ctl.lock().expect("loop ctl lock poisoned") = Some(tx);
        tokio::spawn(dispatch::run(Arc::clone(self), transport, rx));
    }

    fn effective_client_capabilities(&self) -> ClientCapabilities {
        let mut inferred = ClientCapabilities::new();
        if self.handlers.has_request(methods::SAMPLING_CREATE_MESSAGE) {
            inferred.sampling = Some(SamplingCapability::default());
        }
        if self.handlers.has_request(methods::ELICITATION_CREATE) {
            inferred = inferred.with_elicitation();
        }
        if self.handlers.has_request(methods::ROOTS_LIST) {
            inferred.roots = Some(RootsCapability::default());
        }
        match self.options.client_capabilities.clone() {
            Some(explicit) => explicit.merged_over(inferred),
            None => inferred,
        }
    }

    pub(crate) fn effective_server_capabilities(&self) -> ServerCapabilities {
        let mut inferred = ServerCapabilities::new();
        if self.handlers.has_request(methods::TASKS_RESULT) {
            inferred = inferred.with_tasks();
        }
        match self.options.server_capabilities.clone() {
            Some(explicit) => explicit.merged_over(inferred),
            None => inferred,
        }
    }

    /// Warn (or, in strict mode, fail) when a capability is advertised
    /// without a backing handler. Advertising without handling is permitted
    /// by default for testing and forward-compat use.
    fn validate_capabilities(&self) -> Result<(), McplexError> {
        let mut unbacked: Vec<&str> = Vec::new();
        match self.options.role {
            Role::Client => {
                let caps = self.effective_client_capabilities();
                if caps.has_sampling() && !self.handlers.has_request(methods::SAMPLING_CREATE_MESSAGE)
                {
                    unbacked.push("sampling");
                }
                if caps.has_elicitation() && !self.handlers.has_request(methods::ELICITATION_CREATE)
                {
                    unbacked.push("elicitation");
                }
                if caps.has_roots() && !self.handlers.has_request(methods::ROOTS_LIST) {
                    unbacked.push("roots");
                }
            }
            Role::Server => {
                let caps = self.effective_server_capabilities();
                if caps.has_tasks() && !self.handlers.has_request(methods::TASKS_RESULT) {
                    unbacked.push("tasks");
                }
            }
        }

        for capability in &unbacked {
            warn!(capability, "capability advertised without a backing handler");
        }
        if self.options.strict_capabilities && !unbacked.is_empty() {
            return Err(McplexError::InvalidState {
                message: format!(
                    "capabilities advertised without backing handlers: {}",
                    unbacked.join(", ")
                ),
            });
        }
        Ok(())
    }
}

/// Guard that turns a dropped awaiter into a best-effort remote
/// cancellation. Disarmed on every ordinary completion path.
struct PendingGuard {
    core: Arc<SessionCore>,
    id: Option<RequestId>,
    method: String,
}

impl PendingGuard {
    fn new(core: Arc<SessionCore>, id: RequestId, method: &str) -> Self {
        Self {
            core,
            id: Some(id),
            method: method.to_string(),
        }
    }

    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else { return };
        let core = Arc::clone(&self.core);
        let method = std::mem::take(&mut self.method);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            let was_pending = core
                .registry
                .cancel(&id, McplexError::request_cancelled(&method))
                .await
                .is_some();
            // The initialize request is never cancelled over the wire.
            if was_pending && method != methods::INITIALIZE {
                core.send_cancelled(&id, None).await;
            }
        });
    }
}

/// One request of an outgoing batch.
pub struct BatchRequest {
    /// The method to invoke.
    pub method: String,
    /// The method parameters, if any.
    pub params: Option<Value>,
    /// Per-request options.
    pub options: RequestOptions,
}

impl BatchRequest {
    /// Create a batch entry with default options.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            options: RequestOptions::default(),
        }
    }
}

/// A bidirectional JSON-RPC session bound to one transport.
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    /// Create a session. Handlers may be registered until `connect()`.
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        let role = options.role;
        let core = Arc::new(SessionCore {
            options,
            state: StdMutex::new(SessionState::Fresh),
            state_changed: Notify::new(),
            transport: StdRwLock::new(None),
            registry: PendingRegistry::new(),
            handlers: HandlerMap::new(),
            routers: StdRwLock::new(Vec::new()),
            in_flight: StdMutex::new(HashMap::new()),
            next_id: AtomicI64::new(0),
            negotiated: StdMutex::new(None),
            loop_ctl: StdMutex::new(None),
        });

        core.handlers.register_request(
            methods::PING,
            request_handler(|_ctx, _params| async { Ok(json!({})) }),
        );
        if role == Role::Server {
            let weak = Arc::downgrade(&core);
            core.handlers.register_request(
                methods::INITIALIZE,
                request_handler(move |_ctx, params| {
                    let weak = weak.clone();
                    async move {
                        let Some(core) = weak.upgrade() else {
                            return Err(McplexError::internal("session dropped"));
                        };
                        handle_initialize(&core, params)
                    }
                }),
            );
        }

        Self { core }
    }

    /// Register a handler for an inbound request method.
    ///
    /// Registration after `connect()` is a programming error: rejected
    /// loudly in debug builds, ignored with a warning in release builds.
    pub fn on_request(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.core.handlers.register_request(method, handler);
    }

    /// Register a handler for an inbound notification method.
    pub fn on_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.core.handlers.register_notification(method, handler);
    }

    /// Add a response router consulted before pending-request matching.
    pub fn add_response_router(&self, router: Arc<dyn ResponseRouter>) {
        self.core.add_router(router);
    }

    /// Connect the session to a transport and complete the handshake.
    pub async fn connect<T: Transport + 'static>(
        &self,
        transport: T,
    ) -> Result<(), McplexError> {
        {
            let mut state = self.core.state.lock().expect("state lock poisoned");
            if *state != SessionState::Fresh {
                return Err(McplexError::InvalidState {
                    message: format!("connect() called while session is {state}"),
                });
            }
            *state = SessionState::Connecting;
        }
        self.core.handlers.lock();

        if let Err(e) = self.core.validate_capabilities() {
            self.core.set_state(SessionState::Disconnected);
            return Err(e);
        }

        let adapter: Arc<dyn DynTransport> = Arc::new(TransportAdapter(transport));
        self.establish(adapter).await
    }

    /// Rebind the session to a new transport.
    ///
    /// Pending requests survive: responses arriving over the new transport
    /// still complete their original awaiters. The handshake runs again on
    /// the new transport.
    pub async fn reconnect<T: Transport + 'static>(
        &self,
        transport: T,
    ) -> Result<(), McplexError> {
        match self.core.state() {
            SessionState::Ready | SessionState::Disconnected => {}
            state => {
                return Err(McplexError::InvalidState {
                    message: format!("reconnect() called while session is {state}"),
                });
            }
        }

        if let Some(ctl) = self.core.take_loop_ctl() {
            let _ = ctl.send(LoopCommand::Rebind);
        }
        if let Some(old) = self.core.take_transport() {
            let _ = old.disconnect().await;
        }

        let adapter: Arc<dyn DynTransport> = Arc::new(TransportAdapter(transport));
        self.establish(adapter).await
    }

    async fn establish(&self, adapter: Arc<dyn DynTransport>) -> Result<(), McplexError> {
        if let Err(e) = adapter.connect().await {
            self.core.set_state(SessionState::Disconnected);
            return Err(e);
        }
        self.core.set_transport(Arc::clone(&adapter));
        self.core.set_state(SessionState::Handshaking);

        match self.core.options.role {
            Role::Client => {
                let negotiated = match client_handshake(&self.core, adapter.as_ref()).await {
                    Ok(negotiated) => negotiated,
                    Err(e) => {
                        let _ = adapter.disconnect().await;
                        self.core.set_state(SessionState::Disconnected);
                        return Err(e);
                    }
                };
                adapter.set_protocol_version(negotiated.protocol_version.as_str());
                self.core.store_negotiated(negotiated);
                self.core.start_loop(adapter);
                self.core.set_state(SessionState::Ready);
                Ok(())
            }
            Role::Server => {
                self.core.start_loop(adapter);
                self.core.wait_ready().await
            }
        }
    }

    /// Close the session: stop the dispatch loop, close the transport,
    /// drain pending requests with `ConnectionClosed`, and cancel inbound
    /// workers.
    pub async fn disconnect(&self) -> Result<(), McplexError> {
        if let Some(ctl) = self.core.take_loop_ctl() {
            let _ = ctl.send(LoopCommand::Stop);
        }
        if let Some(transport) = self.core.take_transport() {
            let _ = transport.disconnect().await;
        }
        self.core.handle_stream_closed().await;
        Ok(())
    }

    /// Send a request to the peer and await its result.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, McplexError> {
        self.core.do_request(method, params, options).await
    }

    /// Send a batch of requests in one frame and await every outcome.
    ///
    /// Outcomes are returned in input order; completion order on the wire
    /// is unspecified.
    pub async fn request_batch(
        &self,
        items: Vec<BatchRequest>,
    ) -> Result<Vec<Result<Value, McplexError>>, McplexError> {
        if items.is_empty() {
            return Err(McplexError::invalid_request("empty batch"));
        }

        for item in &items {
            self.core.gate_outbound(&item.method)?;
        }

        let mut messages = Vec::with_capacity(items.len());
        let mut awaiters = Vec::with_capacity(items.len());
        for item in items {
            let id = self.core.next_request_id();

            let wants_progress =
                item.options.on_progress.is_some() || item.options.reset_timeout_on_progress;
            let token = wants_progress.then(|| {
                item.options
                    .progress_token
                    .clone()
                    .unwrap_or_else(|| ProgressToken::from(&id))
            });

            let mut params = item.params;
            codec::inject_meta(&mut params, token.as_ref(), item.options.meta.as_ref());

            let timeout = if item.options.no_timeout {
                None
            } else {
                item.options
                    .timeout
                    .or(self.core.options.default_request_timeout)
            };
            let controller = timeout.map(|base| {
                Arc::new(TimeoutController::new(
                    base,
                    item.options.reset_timeout_on_progress,
                    item.options.max_total_timeout,
                ))
            });

            let rx = self
                .core
                .registry
                .register(
                    id.clone(),
                    &item.method,
                    token,
                    item.options.on_progress.clone(),
                    controller.clone(),
                )
                .await?;

            let request = match params {
                Some(params) => Request::with_params(item.method.clone(), id.clone(), params),
                None => Request::new(item.method.clone(), id.clone()),
            };
            messages.push(Message::Request(request));
            awaiters.push((id, item.method, rx, controller));
        }

        if let Err(e) = self.core.send_frame(Frame::Batch(messages), None).await {
            for (id, _, _, _) in &awaiters {
                self.core
                    .registry
                    .cancel(id, McplexError::ConnectionClosed)
                    .await;
            }
            return Err(e);
        }

        let core = &self.core;
        let outcomes = futures::future::join_all(awaiters.into_iter().map(
            |(id, method, rx, controller)| async move {
                let outcome = await_response(rx, controller.as_deref(), &method).await;
                match outcome {
                    Err(McplexError::RequestTimeout { elapsed, .. }) => {
                        core.registry
                            .cancel(&id, McplexError::request_cancelled(&method))
                            .await;
                        core.send_cancelled(
                            &id,
                            Some(format!("Request timed out after {elapsed:?}")),
                        )
                        .await;
                        Err(McplexError::RequestTimeout { method, elapsed })
                    }
                    other => other,
                }
            },
        ))
        .await;

        Ok(outcomes)
    }

    /// Send a notification to the peer.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McplexError> {
        self.core.notify_peer(method, params).await
    }

    /// A cheap-clone handle for talking to the peer, usable from handlers
    /// and collaborating subsystems.
    #[must_use]
    pub fn peer_handle(&self) -> PeerHandle {
        PeerHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// What the handshake established about the peer, once `Ready`.
    #[must_use]
    pub fn negotiated(&self) -> Option<NegotiatedPeer> {
        self.core.negotiated()
    }

    /// Whether the session currently has a live transport.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }
}

fn handle_initialize(
    core: &Arc<SessionCore>,
    params: Option<Value>,
) -> Result<Value, McplexError> {
    let params: InitializeParams = match params {
        Some(params) => serde_json::from_value(params)
            .map_err(|e| McplexError::invalid_params(format!("invalid initialize params: {e}")))?,
        None => return Err(McplexError::invalid_params("missing initialize params")),
    };

    let version = negotiate(&params.protocol_version);
    debug!(
        client = %params.client_info.name,
        requested = %params.protocol_version,
        negotiated = %version,
        "initialize received"
    );

    core.store_negotiated(NegotiatedPeer {
        protocol_version: version,
        client_capabilities: Some(params.capabilities),
        client_info: Some(params.client_info),
        server_capabilities: None,
        server_info: None,
        instructions: None,
    });

    let result = InitializeResult {
        protocol_version: version.as_str().to_string(),
        capabilities: core.effective_server_capabilities(),
        server_info: core.options.server_info.clone(),
        instructions: core.options.instructions.clone(),
    };
    Ok(serde_json::to_value(result)?)
}

/// The client side of the lifecycle handshake, run directly on the
/// transport before the dispatch loop starts.
async fn client_handshake(
    core: &Arc<SessionCore>,
    transport: &dyn DynTransport,
) -> Result<NegotiatedPeer, McplexError> {
    let offered = ProtocolVersion::LATEST;
    let params = InitializeParams {
        protocol_version: offered.as_str().to_string(),
        capabilities: core.effective_client_capabilities(),
        client_info: core.options.client_info.clone(),
    };
    let id = core.next_request_id();
    let request = Request::with_params(
        methods::INITIALIZE,
        id.clone(),
        serde_json::to_value(&params)?,
    );
    transport.send(request.into(), None).await?;

    let response = loop {
        match transport.recv().await? {
            Some(message) => match message.frame {
                Frame::Single(Message::Response(response)) if response.id == id => break response,
                other => {
                    trace!(?other, "skipping frame received before initialize response");
                }
            },
            None => {
                return Err(McplexError::handshake_failed(
                    "connection closed during initialization",
                ));
            }
        }
    };

    let result = response.into_result().map_err(|e| {
        McplexError::handshake_failed_with_versions(
            format!("initialize rejected: {}", e.message),
            Some(offered.as_str().to_string()),
            None,
        )
    })?;
    let result: InitializeResult = serde_json::from_value(result).map_err(|e| {
        McplexError::handshake_failed_with_versions(
            format!("malformed initialize result: {e}"),
            Some(offered.as_str().to_string()),
            None,
        )
    })?;

    let Ok(version) = result.protocol_version.parse::<ProtocolVersion>() else {
        // Not in our supported set: the client must disconnect.
        error!(
            server_version = %result.protocol_version,
            "server answered with unsupported protocol version"
        );
        return Err(McplexError::handshake_failed_with_versions(
            format!(
                "unsupported protocol version '{}' from server",
                result.protocol_version
            ),
            Some(offered.as_str().to_string()),
            Some(result.protocol_version.clone()),
        ));
    };

    // Initialized goes out strictly after the response is accepted and
    // strictly before any other outbound message.
    transport
        .send(
            Notification::new(methods::NOTIFICATION_INITIALIZED).into(),
            None,
        )
        .await?;

    debug!(
        server = %result.server_info.name,
        protocol_version = %version,
        "handshake complete"
    );

    Ok(NegotiatedPeer {
        protocol_version: version,
        client_capabilities: None,
        client_info: None,
        server_capabilities: Some(result.capabilities),
        server_info: Some(result.server_info),
        instructions: result.instructions,
    })
}
