//! The transport contract.
//!
//! A transport is a bidirectional channel carrying parsed JSON-RPC messages
//! between two protocol engines. It is the one seam the core exposes
//! outward: stdio pipes, HTTP streams, and in-memory channels all implement
//! the same trait.
//!
//! The engine consumes a transport with a receive loop: `recv()` returning
//! `Ok(None)` is the close event, `Err(_)` the error event. Exactly one
//! engine owns a transport at a time.

use mcpflow_core::protocol::{Message, RequestId};
use std::future::Future;
use std::time::Instant;

/// Metadata about a transport connection.
#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    /// Transport type identifier (e.g., "stdio", "http", "memory").
    pub transport_type: String,
    /// Remote address, if applicable.
    pub remote_addr: Option<String>,
    /// Local address, if applicable.
    pub local_addr: Option<String>,
    /// When the connection was established.
    pub connected_at: Option<Instant>,
}

impl TransportMetadata {
    /// Create new metadata for a transport type.
    #[must_use]
    pub fn new(transport_type: impl Into<String>) -> Self {
        Self {
            transport_type: transport_type.into(),
            remote_addr: None,
            local_addr: None,
            connected_at: None,
        }
    }

    /// Set the remote address.
    #[must_use]
    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Set the local address.
    #[must_use]
    pub fn local_addr(mut self, addr: impl Into<String>) -> Self {
        self.local_addr = Some(addr.into());
        self
    }

    /// Mark the connection time.
    #[must_use]
    pub fn connected_now(mut self) -> Self {
        self.connected_at = Some(Instant::now());
        self
    }
}

/// Core transport trait for MCP communication.
///
/// Implementations should be `Send + Sync` and handle concurrent access
/// safely: `send` and `recv` are independent and may be called from
/// different tasks.
///
/// # Example Implementation
///
/// ```ignore
/// struct MyTransport { /* ... */ }
///
/// impl Transport for MyTransport {
///     type Error = MyError;
///
///     fn send(
///         &self,
///         msg: Message,
///         related_request_id: Option<&RequestId>,
///     ) -> impl Future<Output = Result<(), Self::Error>> + Send {
///         async move { Ok(()) }
///     }
///     // ... other methods
/// }
/// ```
pub trait Transport: Send + Sync {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start the transport.
    ///
    /// Must reject on a transport that has already been closed.
    fn start(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a message over the transport.
    ///
    /// `related_request_id` is an opaque hint for multiplexing transports
    /// (e.g., routing a response onto the SSE stream that carried its
    /// request). Point-to-point transports ignore it.
    fn send(
        &self,
        msg: Message,
        related_request_id: Option<&RequestId>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive a message from the transport.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send;

    /// Close the transport connection. Idempotent.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The stable session identity for this connection, if any.
    fn session_id(&self) -> Option<String>;

    /// Check if the transport is still connected.
    fn is_connected(&self) -> bool;

    /// Get metadata about the transport.
    fn metadata(&self) -> TransportMetadata;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_builder() {
        let meta = TransportMetadata::new("memory")
            .remote_addr("peer-1")
            .local_addr("peer-0")
            .connected_now();

        assert_eq!(meta.transport_type, "memory");
        assert!(meta.remote_addr.is_some());
        assert!(meta.connected_at.is_some());
    }
}
