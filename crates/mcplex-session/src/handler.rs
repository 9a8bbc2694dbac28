//! Handler registration for inbound requests and notifications.
//!
//! Handlers are registered before [`connect`](crate::Session::connect) and
//! locked once the session connects: reconnection reuses the same handlers,
//! which removes a class of registration-ordering races. The lock is
//! one-way and never resets.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::warn;

use mcplex_core::McplexError;

use crate::context::{PeerHandle, RequestContext};

/// A boxed future returned by dyn-safe handler traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for one inbound request method.
///
/// Handlers run in detached workers; a handler may issue nested requests
/// back to the peer through the context's [`PeerHandle`]. Errors that are
/// not protocol-typed are sanitized to an internal error before they reach
/// the wire.
pub trait RequestHandler: Send + Sync {
    /// Handle an inbound request, producing the result value.
    fn handle(
        &self,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> BoxFuture<'static, Result<Value, McplexError>>;
}

/// Handler for one inbound notification method.
pub trait NotificationHandler: Send + Sync {
    /// Handle an inbound notification.
    fn handle(&self, peer: PeerHandle, params: Option<Value>) -> BoxFuture<'static, ()>;
}

struct FnRequestHandler<F>(F);

impl<F, Fut> RequestHandler for FnRequestHandler<F>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, McplexError>> + Send + 'static,
{
    fn handle(
        &self,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> BoxFuture<'static, Result<Value, McplexError>> {
        Box::pin((self.0)(ctx, params))
    }
}

/// Wrap an async closure as a [`RequestHandler`].
pub fn request_handler<F, Fut>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, McplexError>> + Send + 'static,
{
    Arc::new(FnRequestHandler(f))
}

struct FnNotificationHandler<F>(F);

impl<F, Fut> NotificationHandler for FnNotificationHandler<F>
where
    F: Fn(PeerHandle, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, peer: PeerHandle, params: Option<Value>) -> BoxFuture<'static, ()> {
        Box::pin((self.0)(peer, params))
    }
}

/// Wrap an async closure as a [`NotificationHandler`].
pub fn notification_handler<F, Fut>(f: F) -> Arc<dyn NotificationHandler>
where
    F: Fn(PeerHandle, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnNotificationHandler(f))
}

/// Method-keyed handler tables with the one-way registration lock.
#[derive(Default)]
pub(crate) struct HandlerMap {
    requests: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    notifications: RwLock<HashMap<String, Arc<dyn NotificationHandler>>>,
    locked: AtomicBool,
}

impl HandlerMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lock registration. One-way; never resets.
    pub(crate) fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn check_unlocked(&self, method: &str) -> bool {
        if self.is_locked() {
            debug_assert!(
                false,
                "handler registration for '{method}' after connect() is a programming error"
            );
            warn!(method, "ignoring handler registered after connect()");
            return false;
        }
        true
    }

    pub(crate) fn register_request(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        let method = method.into();
        if !self.check_unlocked(&method) {
            return;
        }
        self.requests
            .write()
            .expect("handler lock poisoned")
            .insert(method, handler);
    }

    pub(crate) fn register_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        let method = method.into();
        if !self.check_unlocked(&method) {
            return;
        }
        self.notifications
            .write()
            .expect("handler lock poisoned")
            .insert(method, handler);
    }

    pub(crate) fn request(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests
            .read()
            .expect("handler lock poisoned")
            .get(method)
            .cloned()
    }

    pub(crate) fn notification(&self, method: &str) -> Option<Arc<dyn NotificationHandler>> {
        self.notifications
            .read()
            .expect("handler lock poisoned")
            .get(method)
            .cloned()
    }

    pub(crate) fn has_request(&self, method: &str) -> bool {
        self.requests
            .read()
            .expect("handler lock poisoned")
            .contains_key(method)
    }
}
