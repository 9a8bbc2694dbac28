//! In-memory transport for testing and in-process sessions.
//!
//! Messages sent on one side of a [`MemoryTransport::pair`] are received on
//! the other. Both sides share a connected flag, so disconnecting either
//! side ends the conversation for both.

use crate::error::TransportError;
use crate::traits::{Transport, TransportMessage, TransportMetadata};
use async_lock::Mutex as AsyncMutex;
use mcplex_core::protocol::{Frame, RequestId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// An in-memory transport backed by channels.
pub struct MemoryTransport {
    sender: mpsc::Sender<TransportMessage>,
    receiver: AsyncMutex<mpsc::Receiver<TransportMessage>>,
    connected: Arc<AtomicBool>,
    closed: Arc<Notify>,
    metadata: TransportMetadata,
}

impl MemoryTransport {
    /// Create a connected pair of memory transports.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(64)
    }

    /// Create a connected pair with a specific channel capacity.
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (tx1, rx1) = mpsc::channel(capacity);
        let (tx2, rx2) = mpsc::channel(capacity);

        let connected = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(Notify::new());

        let transport1 = Self {
            sender: tx2,
            receiver: AsyncMutex::new(rx1),
            connected: Arc::clone(&connected),
            closed: Arc::clone(&closed),
            metadata: TransportMetadata::new("memory")
                .local_addr("peer-0")
                .remote_addr("peer-1")
                .connected_now(),
        };

        let transport2 = Self {
            sender: tx1,
            receiver: AsyncMutex::new(rx2),
            connected,
            closed,
            metadata: TransportMetadata::new("memory")
                .local_addr("peer-1")
                .remote_addr("peer-0")
                .connected_now(),
        };

        (transport1, transport2)
    }
}

impl Transport for MemoryTransport {
    type Error = TransportError;

    async fn connect(&self) -> Result<(), Self::Error> {
        if self.is_connected() {
            Ok(())
        } else {
            // A memory pair cannot be re-established once torn down.
            Err(TransportError::ConnectionClosed)
        }
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.notify_waiters();
        Ok(())
    }

    async fn send(
        &self,
        frame: Frame,
        _related_request_id: Option<&RequestId>,
    ) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sender
            .send(TransportMessage::new(frame))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Option<TransportMessage>, Self::Error> {
        let notified = self.closed.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so a concurrent
        // disconnect cannot slip between the check and the wait.
        notified.as_mut().enable();
        if !self.is_connected() {
            return Ok(None);
        }

        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            () = notified => Ok(None),
            message = receiver.recv() => {
                if message.is_none() {
                    self.connected.store(false, Ordering::SeqCst);
                }
                Ok(message)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn metadata(&self) -> TransportMetadata {
        self.metadata.clone()
    }
}
