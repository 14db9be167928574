//! In-memory transport for testing and in-process communication.
//!
//! A [`MemoryTransport::pair`] is two endpoints of one logical connection:
//! they share a session identity and an open flag, and each endpoint's
//! outbound channel feeds the other's inbound side. Closing either endpoint
//! closes the connection for both.
//!
//! # Example
//!
//! ```rust
//! use mcpflow_transport::{MemoryTransport, Transport};
//!
//! let (left, right) = MemoryTransport::pair();
//! assert_eq!(left.session_id(), right.session_id());
//! ```

use crate::error::TransportError;
use crate::traits::{Transport, TransportMetadata};
use async_lock::Mutex as AsyncMutex;
use futures::{SinkExt, StreamExt};
use mcpflow_core::protocol::{Message, RequestId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// State shared by both endpoints of a pair.
struct Link {
    session_id: String,
    open: AtomicBool,
    established: std::time::Instant,
}

impl Link {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            open: AtomicBool::new(true),
            established: std::time::Instant::now(),
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn shut(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// One endpoint of an in-memory connection.
///
/// Messages sent here are received on the paired endpoint. The session id
/// is generated per pair, so both endpoints report the same identity.
pub struct MemoryTransport {
    link: Arc<Link>,
    outbound: AsyncMutex<futures::channel::mpsc::Sender<Message>>,
    inbound: AsyncMutex<futures::channel::mpsc::Receiver<Message>>,
    side: &'static str,
}

impl MemoryTransport {
    /// Create a connected pair of endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(32)
    }

    /// Create a connected pair whose channels buffer up to `capacity`
    /// messages per direction.
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let link = Link::new();
        let (to_right, from_left) = futures::channel::mpsc::channel(capacity);
        let (to_left, from_right) = futures::channel::mpsc::channel(capacity);

        let left = Self {
            link: Arc::clone(&link),
            outbound: AsyncMutex::new(to_right),
            inbound: AsyncMutex::new(from_right),
            side: "left",
        };
        let right = Self {
            link,
            outbound: AsyncMutex::new(to_left),
            inbound: AsyncMutex::new(from_left),
            side: "right",
        };
        (left, right)
    }
}

impl Transport for MemoryTransport {
    type Error = TransportError;

    async fn start(&self) -> Result<(), Self::Error> {
        if self.link.is_open() {
            Ok(())
        } else {
            Err(TransportError::invalid_state(
                "memory transport already closed",
            ))
        }
    }

    async fn send(
        &self,
        msg: Message,
        _related_request_id: Option<&RequestId>,
    ) -> Result<(), Self::Error> {
        if !self.link.is_open() {
            return Err(TransportError::NotConnected);
        }
        let mut outbound = self.outbound.lock().await;
        outbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        if !self.link.is_open() {
            return Ok(None);
        }
        let next = self.inbound.lock().await.next().await;
        if next.is_none() {
            // the peer hung up
            self.link.shut();
        }
        Ok(next)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.link.shut();
        // wake a peer parked in recv()
        self.outbound.lock().await.close_channel();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        Some(self.link.session_id.clone())
    }

    fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    fn metadata(&self) -> TransportMetadata {
        TransportMetadata {
            transport_type: "memory".to_string(),
            local_addr: Some(self.side.to_string()),
            remote_addr: Some(
                if self.side == "left" { "right" } else { "left" }.to_string(),
            ),
            connected_at: Some(self.link.established),
        }
    }
}
