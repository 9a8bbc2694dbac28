//! One-shot resolution cells.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use mcplex_core::McplexError;

/// A one-shot async cell bridging enqueue-and-wait to a routed response.
///
/// Completion is idempotent: the first of `resolve`/`reject` wins and later
/// calls are ignored.
pub struct Resolver<T> {
    state: Arc<ResolverState<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

struct ResolverState<T> {
    completed: AtomicBool,
    cell: Mutex<Option<Result<T, McplexError>>>,
    notify: Notify,
}

impl<T> Resolver<T> {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ResolverState {
                completed: AtomicBool::new(false),
                cell: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Complete with a value. Ignored when already completed.
    pub fn resolve(&self, value: T) {
        self.finish(Ok(value));
    }

    /// Complete with an error. Ignored when already completed.
    pub fn reject(&self, error: McplexError) {
        self.finish(Err(error));
    }

    fn finish(&self, outcome: Result<T, McplexError>) {
        if self.state.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.cell.lock().expect("resolver lock poisoned") = Some(outcome);
        self.state.notify.notify_waiters();
    }

    /// Whether the resolver has been completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state.completed.load(Ordering::SeqCst)
    }

    /// Wait for completion and take the outcome.
    pub async fn wait(&self) -> Result<T, McplexError> {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self
                .state
                .cell
                .lock()
                .expect("resolver lock poisoned")
                .take()
            {
                return outcome;
            }
            notified.await;
        }
    }
}

impl<T> Default for Resolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("completed", &self.is_completed())
            .finish()
    }
}
