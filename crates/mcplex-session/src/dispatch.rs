//! The dispatch loop: single consumer of the transport receive side.
//!
//! Each received frame is routed to the pending-request registry (for
//! responses, after consulting response routers), to a spawned handler
//! worker (for requests), or onto the bounded notification queue consumed
//! by a dedicated dispatcher task. The loop itself never blocks on handler
//! work; spawning workers is what lets a handler make nested outbound
//! requests and still observe the response.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace, warn};

use mcplex_core::error::JsonRpcError;
use mcplex_core::meta;
use mcplex_core::methods;
use mcplex_core::protocol::{Frame, Message, Notification, Request, Response};
use mcplex_core::types::{CancelledParams, ProgressParams, Task, TaskMetadata};
use mcplex_core::McplexError;
use mcplex_transport::{MessageMeta, TransportMessage};

use crate::cancellation::CancellationToken;
use crate::context::{PeerHandle, RequestContext};
use crate::options::Role;
use crate::session::{DynTransport, SessionCore, SessionState};

/// Command sent to a running dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopCommand {
    /// Keep running.
    Run,
    /// Exit without draining: the session is rebinding to a new transport.
    Rebind,
    /// Exit; the session is shutting down and handles cleanup itself.
    Stop,
}

enum LoopExit {
    Closed,
    Rebind,
    Stop,
}

/// Run the dispatch loop until the stream ends or a command stops it.
pub(crate) async fn run(
    core: Arc<SessionCore>,
    transport: Arc<dyn DynTransport>,
    mut ctl: watch::Receiver<LoopCommand>,
) {
    let (notif_tx, notif_rx) = mpsc::channel(core.notification_queue_size());
    let notif_task = tokio::spawn(consume_notifications(Arc::clone(&core), notif_rx));

    let exit = loop {
        // Biased so a rebind command wins over the old transport's close:
        // both become ready together during reconnection, and draining on
        // the close would wrongly fail requests that survive the rebind.
        tokio::select! {
            biased;
            changed = ctl.changed() => {
                if changed.is_err() {
                    break LoopExit::Stop;
                }
                match *ctl.borrow() {
                    LoopCommand::Run => {}
                    LoopCommand::Rebind => break LoopExit::Rebind,
                    LoopCommand::Stop => break LoopExit::Stop,
                }
            }
            received = transport.recv() => match received {
                Ok(Some(message)) => handle_message(&core, message, &notif_tx).await,
                Ok(None) => {
                    debug!("transport stream ended");
                    break LoopExit::Closed;
                }
                Err(e) => {
                    error!(error = %e, "transport error in dispatch loop");
                    break LoopExit::Closed;
                }
            }
        }
    };

    drop(notif_tx);
    let _ = notif_task.await;

    match exit {
        LoopExit::Closed => core.handle_stream_closed().await,
        // Rebind keeps the pending registry and in-flight workers alive;
        // Stop leaves cleanup to disconnect().
        LoopExit::Rebind | LoopExit::Stop => {}
    }
    debug!("dispatch loop stopped");
}

async fn handle_message(
    core: &Arc<SessionCore>,
    message: TransportMessage,
    notif_tx: &mpsc::Sender<(Notification, MessageMeta)>,
) {
    let meta = message.meta;
    match message.frame {
        Frame::Single(Message::Response(response)) => handle_response(core, response).await,
        Frame::Single(Message::Request(request)) => {
            spawn_request_worker(core, request, meta);
        }
        Frame::Single(Message::Notification(notification)) => {
            if notif_tx.send((notification, meta)).await.is_err() {
                warn!("notification dispatcher gone; dropping notification");
            }
        }
        Frame::Batch(messages) => handle_batch(core, messages, meta, notif_tx).await,
    }
}

async fn handle_batch(
    core: &Arc<SessionCore>,
    messages: Vec<Message>,
    meta: MessageMeta,
    notif_tx: &mpsc::Sender<(Notification, MessageMeta)>,
) {
    if messages.is_empty() {
        warn!("received empty batch frame");
        return;
    }

    let mut requests = Vec::new();
    for message in messages {
        match message {
            Message::Response(response) => handle_response(core, response).await,
            Message::Notification(notification) => {
                if notif_tx.send((notification, meta.clone())).await.is_err() {
                    warn!("notification dispatcher gone; dropping notification");
                }
            }
            Message::Request(request) => requests.push(request),
        }
    }

    if requests.is_empty() {
        return;
    }

    // One worker runs the batch's requests concurrently and emits a single
    // response array; notifications contribute no entries, and cancelled
    // requests are suppressed from the array.
    let core = Arc::clone(core);
    tokio::spawn(async move {
        let workers = requests.into_iter().map(|request| {
            let core = Arc::clone(&core);
            let meta = meta.clone();
            async move {
                let id = request.id.clone();
                let token = core.track_inbound(&id);
                let response = run_handler(&core, request, meta, &token).await;
                core.untrack_inbound(&id);
                response.filter(|_| !token.is_cancelled())
            }
        });

        let responses: Vec<Response> = futures::future::join_all(workers)
            .await
            .into_iter()
            .flatten()
            .collect();

        if responses.is_empty() {
            return;
        }
        let frame = Frame::Batch(responses.into_iter().map(Message::Response).collect());
        if let Err(e) = core.send_frame(frame, None).await {
            error!(error = %e, "failed to send batch response");
        }
    });
}

async fn handle_response(core: &Arc<SessionCore>, response: Response) {
    // Response routers get first claim; this is how replies reach
    // resolvers awaiting inside a running task.
    for router in core.routers() {
        if router.route(&response).await {
            trace!(id = %response.id, "response consumed by router");
            return;
        }
    }

    let id = response.id.clone();
    let outcome = response.into_result().map_err(McplexError::from);
    if !core.registry.complete(&id, outcome).await {
        warn!(%id, "received response for unknown request");
    }
}

fn spawn_request_worker(core: &Arc<SessionCore>, request: Request, meta: MessageMeta) {
    let core = Arc::clone(core);
    tokio::spawn(async move {
        let id = request.id.clone();
        let token = core.track_inbound(&id);
        let response = run_handler(&core, request, meta, &token).await;
        core.untrack_inbound(&id);

        let Some(response) = response else { return };
        // A worker cancelled after computing its response still emits
        // nothing.
        if token.is_cancelled() {
            debug!(%id, "suppressing response for cancelled request");
            return;
        }
        if let Err(e) = core
            .send_message(Message::Response(response), Some(&id))
            .await
        {
            error!(%id, error = %e, "failed to send response");
        }
    });
}

/// Run the handler for one inbound request.
///
/// Returns `None` when the worker observed cancellation: no response frame
/// may leave the session for a cancelled request.
async fn run_handler(
    core: &Arc<SessionCore>,
    request: Request,
    meta: MessageMeta,
    token: &CancellationToken,
) -> Option<Response> {
    let id = request.id.clone();
    let method = request.method.to_string();
    trace!(%id, method, "handling inbound request");

    let Some(handler) = core.handlers.request(&method) else {
        warn!(%id, method, "no handler for inbound request");
        return Some(Response::error(
            id,
            JsonRpcError::method_not_found(format!("Method not found: {method}")),
        ));
    };

    let ctx = RequestContext {
        request_id: id.clone(),
        progress_token: meta::progress_token_of(request.params.as_ref()),
        task: task_metadata_of(request.params.as_ref()),
        meta,
        peer: PeerHandle {
            core: Arc::clone(core),
        },
        cancel: token.clone(),
    };

    let work = handler.handle(ctx, request.params);
    let result = tokio::select! {
        () = token.cancelled() => {
            debug!(%id, method, "inbound request cancelled by peer");
            return None;
        }
        result = work => result,
    };

    // Check again before emitting either frame: cancellation may have
    // arrived while the handler was finishing.
    if token.is_cancelled() {
        return None;
    }

    match result {
        Ok(value) => Some(Response::success(id, value)),
        Err(err) if err.is_protocol() => Some(Response::error(id, JsonRpcError::from(&err))),
        Err(err) => {
            // Full detail is logged, never wired.
            error!(%id, method, error = %err, "handler failed");
            Some(Response::error(
                id,
                JsonRpcError::internal_error("Internal error"),
            ))
        }
    }
}

fn task_metadata_of(params: Option<&Value>) -> Option<TaskMetadata> {
    let task = meta::meta_of(params)?.get(meta::TASK)?;
    serde_json::from_value(task.clone()).ok()
}

async fn consume_notifications(
    core: Arc<SessionCore>,
    mut rx: mpsc::Receiver<(Notification, MessageMeta)>,
) {
    while let Some((notification, _meta)) = rx.recv().await {
        let method = notification.method.to_string();
        trace!(method, "dispatching notification");

        match method.as_str() {
            methods::NOTIFICATION_PROGRESS => {
                match notification
                    .params
                    .map(serde_json::from_value::<ProgressParams>)
                {
                    Some(Ok(params)) => core.registry.on_progress(params).await,
                    _ => warn!("malformed progress notification"),
                }
            }
            methods::NOTIFICATION_CANCELLED => {
                match notification
                    .params
                    .map(serde_json::from_value::<CancelledParams>)
                {
                    Some(Ok(params)) => {
                        // Names a request the peer previously sent to us;
                        // unknown ids (already completed) are ignored.
                        if let Some(token) = core.inbound_token(&params.request_id) {
                            debug!(id = %params.request_id, reason = ?params.reason,
                                "peer cancelled inbound request");
                            token.cancel();
                        }
                    }
                    _ => warn!("malformed cancelled notification"),
                }
            }
            methods::NOTIFICATION_INITIALIZED => {
                if core.role() == Role::Server && core.state() == SessionState::Handshaking {
                    debug!("handshake complete");
                    core.apply_negotiated_version();
                    core.set_state(SessionState::Ready);
                }
            }
            methods::NOTIFICATION_TASK_STATUS => {
                if let Some(params) = &notification.params {
                    if let Ok(task) = serde_json::from_value::<Task>(params.clone()) {
                        if task.status.is_terminal() {
                            core.registry.on_task_terminal(&task.task_id).await;
                        }
                    }
                }
                dispatch_user_notification(&core, &method, notification.params).await;
            }
            _ => dispatch_user_notification(&core, &method, notification.params).await,
        }
    }
}

async fn dispatch_user_notification(
    core: &Arc<SessionCore>,
    method: &str,
    params: Option<Value>,
) {
    if let Some(handler) = core.handlers.notification(method) {
        let peer = PeerHandle {
            core: Arc::clone(core),
        };
        handler.handle(peer, params).await;
    } else {
        trace!(method, "unhandled notification");
    }
}
