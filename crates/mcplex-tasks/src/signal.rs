//! Per-task update signalling shared by the store and the queue.
//!
//! A single signal registry backs both `TaskStore::wait_for_update` and
//! `TaskMessageQueue::wait_for_message`: a `tasks/result` poll parked on a
//! task wakes on status changes, stored results, *and* newly queued
//! side-channel messages. Signalling only on status changes would deadlock
//! the poll.
//!
//! Each task carries an epoch counter so a waiter can observe state, then
//! wait "since" the epoch it saw; an update landing in between completes
//! the wait immediately instead of being lost.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use mcplex_core::types::TaskId;

#[derive(Default)]
struct SignalEntry {
    epoch: AtomicU64,
    notify: Notify,
}

/// Registry of per-task update signals.
#[derive(Default)]
pub struct TaskSignals {
    entries: Mutex<HashMap<TaskId, Arc<SignalEntry>>>,
}

impl TaskSignals {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &TaskId) -> Arc<SignalEntry> {
        let mut entries = self.entries.lock().expect("signal lock poisoned");
        Arc::clone(entries.entry(id.clone()).or_default())
    }

    /// The task's current update epoch.
    #[must_use]
    pub fn epoch(&self, id: &TaskId) -> u64 {
        self.entry(id).epoch.load(Ordering::SeqCst)
    }

    /// Record an update, waking every waiter on this task.
    pub fn notify(&self, id: &TaskId) {
        let entry = self.entry(id);
        entry.epoch.fetch_add(1, Ordering::SeqCst);
        entry.notify.notify_waiters();
    }

    /// Wait until the task's epoch moves past `seen`.
    ///
    /// Returns immediately when an update already landed after `seen` was
    /// observed. Dropping the future cancels only this waiter.
    pub async fn wait_since(&self, id: &TaskId, seen: u64) {
        let entry = self.entry(id);
        loop {
            let notified = entry.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if entry.epoch.load(Ordering::SeqCst) != seen {
                return;
            }
            notified.await;
        }
    }

    /// Drop a task's signal entry.
    pub fn remove(&self, id: &TaskId) {
        self.entries
            .lock()
            .expect("signal lock poisoned")
            .remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id() -> TaskId {
        TaskId::from("t-1")
    }

    #[tokio::test]
    async fn test_wait_returns_on_notify() {
        let signals = Arc::new(TaskSignals::new());
        let seen = signals.epoch(&id());

        let waiter = {
            let signals = Arc::clone(&signals);
            tokio::spawn(async move { signals.wait_since(&id(), seen).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signals.notify(&id());

        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_between_observe_and_wait_is_not_lost() {
        let signals = TaskSignals::new();
        let seen = signals.epoch(&id());

        // Update lands before the waiter parks.
        signals.notify(&id());

        tokio::time::timeout(Duration::from_millis(50), signals.wait_since(&id(), seen))
            .await
            .expect("wait must return immediately for an already-passed epoch");
    }

    #[tokio::test]
    async fn test_independent_waiters() {
        let signals = Arc::new(TaskSignals::new());
        let seen = signals.epoch(&id());

        // One waiter is dropped (cancelled); the other must still wake.
        let dropped = {
            let signals = Arc::clone(&signals);
            tokio::spawn(async move { signals.wait_since(&id(), seen).await })
        };
        dropped.abort();

        let kept = {
            let signals = Arc::clone(&signals);
            tokio::spawn(async move { signals.wait_since(&id(), seen).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        signals.notify(&id());

        tokio::time::timeout(Duration::from_millis(500), kept)
            .await
            .expect("surviving waiter should wake")
            .unwrap();
    }
}
