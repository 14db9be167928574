//! Transport abstractions for the mcpflow runtime.
//!
//! This crate defines the [`Transport`] trait, the one seam the protocol
//! core exposes outward, plus an in-memory implementation for tests and
//! in-process wiring.
//!
//! Concrete network transports (stdio framing, Streamable HTTP, SSE) live
//! outside this workspace; they only need to satisfy the trait:
//!
//! | Operation | Contract |
//! |-----------|----------|
//! | `start()` | reject on closed transports |
//! | `send(msg, related_request_id)` | serialize and write; the id is a multiplexing hint |
//! | `recv()` | `Ok(None)` on clean close |
//! | `close()` | idempotent |
//! | `session_id()` | stable per connection |
//!
//! # Example
//!
//! ```rust
//! use mcpflow_transport::{MemoryTransport, Transport};
//! use mcpflow_core::protocol::{Message, Notification};
//!
//! # async fn example() -> Result<(), mcpflow_transport::TransportError> {
//! let (a, b) = MemoryTransport::pair();
//! a.send(Message::Notification(Notification::new("ping")), None).await?;
//! let received = b.recv().await?;
//! assert!(received.is_some());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod traits;

pub use error::TransportError;
pub use memory::MemoryTransport;
pub use traits::{Transport, TransportMetadata};
