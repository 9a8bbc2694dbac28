//! Per-request timeout control.
//!
//! Every outbound request with a timeout gets a [`TimeoutController`].
//! Without reset-on-progress the deadline is fixed at `start + base`. With
//! it, each progress notification carrying the request's token advances the
//! deadline to `now + base`, bounded by `start + max_total`.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use mcplex_core::McplexError;

/// Deadline state for one pending request.
#[derive(Debug)]
pub struct TimeoutController {
    base: Duration,
    reset_on_progress: bool,
    max_total: Option<Duration>,
    started_at: Instant,
    deadline: Mutex<Instant>,
    changed: Notify,
}

impl TimeoutController {
    /// Create a controller whose initial deadline is `now + base`.
    #[must_use]
    pub fn new(base: Duration, reset_on_progress: bool, max_total: Option<Duration>) -> Self {
        let started_at = Instant::now();
        let deadline = Self::clamp(started_at, max_total, started_at + base);
        Self {
            base,
            reset_on_progress,
            max_total,
            started_at,
            deadline: Mutex::new(deadline),
            changed: Notify::new(),
        }
    }

    fn clamp(started_at: Instant, max_total: Option<Duration>, candidate: Instant) -> Instant {
        match max_total {
            Some(max) => candidate.min(started_at + max),
            None => candidate,
        }
    }

    /// The current deadline.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        *self.deadline.lock().expect("deadline lock poisoned")
    }

    /// How long the request has been outstanding.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record a progress notification for this request.
    ///
    /// When reset-on-progress is enabled the deadline advances to
    /// `now + base`, never past `start + max_total`.
    pub fn signal_progress(&self) {
        if !self.reset_on_progress {
            return;
        }
        let candidate = Self::clamp(self.started_at, self.max_total, Instant::now() + self.base);
        let mut deadline = self.deadline.lock().expect("deadline lock poisoned");
        if candidate != *deadline {
            *deadline = candidate;
            drop(deadline);
            self.changed.notify_waiters();
        }
    }

    /// Wait for the deadline to move.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

/// Await a response slot, racing it against an optional deadline.
///
/// On timeout the registry entry is left in place; the caller performs the
/// cancel-and-notify cleanup so the outbound `notifications/cancelled` can
/// carry the timeout reason.
pub(crate) async fn await_response(
    mut rx: futures::channel::oneshot::Receiver<Result<serde_json::Value, McplexError>>,
    controller: Option<&TimeoutController>,
    method: &str,
) -> Result<serde_json::Value, McplexError> {
    let Some(controller) = controller else {
        return flatten(&mut rx, method).await;
    };

    loop {
        let deadline = controller.deadline();
        tokio::select! {
            outcome = &mut rx => {
                return match outcome {
                    Ok(result) => result,
                    Err(_) => Err(McplexError::internal(format!(
                        "response slot for '{method}' dropped without completion"
                    ))),
                };
            }
            () = controller.changed() => {
                // Deadline moved; recompute the sleep.
            }
            () = tokio::time::sleep_until(deadline) => {
                // The deadline may have advanced while we were parked.
                if controller.deadline() <= Instant::now() {
                    return Err(McplexError::RequestTimeout {
                        method: method.to_string(),
                        elapsed: controller.elapsed(),
                    });
                }
            }
        }
    }
}

async fn flatten(
    rx: &mut futures::channel::oneshot::Receiver<Result<serde_json::Value, McplexError>>,
    method: &str,
) -> Result<serde_json::Value, McplexError> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(McplexError::internal(format!(
            "response slot for '{method}' dropped without completion"
        ))),
    }
}
