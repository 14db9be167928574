//! # mcpflow
//!
//! A transport-agnostic Model Context Protocol runtime: a bidirectional
//! JSON-RPC 2.0 engine with long-running task semantics, progress
//! notifications, cancellation, capability negotiation, and per-task
//! side-channel message queues.
//!
//! ## Crate Organization
//!
//! - [`mcpflow_core`] - Message model, capabilities, errors (no async runtime)
//! - [`mcpflow_transport`] - The transport contract and an in-memory pair
//! - [`mcpflow_engine`] - The protocol engine and task subsystem
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcpflow::prelude::*;
//! use mcpflow_transport::MemoryTransport;
//!
//! # async fn example() -> Result<(), McpError> {
//! let (client_side, server_side) = MemoryTransport::pair();
//!
//! let server = Protocol::new(
//!     ProtocolOptions::new().capabilities(Capabilities::new().with_tools()),
//! );
//! server.serve(Implementation::new("demo-server", "1.0.0"), None)?;
//! server.connect(server_side).await?;
//!
//! let client = Protocol::new(ProtocolOptions::new());
//! client.connect(client_side).await?;
//! let init = client
//!     .initialize(Implementation::new("demo-client", "1.0.0"))
//!     .await?;
//! assert!(init.capabilities.has_tools());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub use mcpflow_core;
pub use mcpflow_engine;
pub use mcpflow_transport;

pub mod prelude;
