//! # mcpflow-engine
//!
//! The bidirectional MCP protocol engine: request/response correlation over
//! a [`mcpflow_transport::Transport`], timeouts with progress-based
//! re-arming, cancellation in both directions, notification debouncing,
//! capability gating, the initialize handshake, and the task subsystem
//! (stores, side-channel queues, built-in `tasks/*` handlers, and a polling
//! stream).
//!
//! # Example
//!
//! ```no_run
//! use mcpflow_core::capability::{Capabilities, Implementation};
//! use mcpflow_engine::{Protocol, ProtocolOptions};
//! use mcpflow_transport::MemoryTransport;
//!
//! # async fn example() -> Result<(), mcpflow_core::error::McpError> {
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
//! let init = client.initialize(Implementation::new("demo-client", "1.0.0")).await?;
//! assert!(init.capabilities.has_tools());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod context;
mod engine;
mod handshake;
mod options;
pub mod tasks;

pub use context::{CancellationToken, RequestContext};
pub use engine::{NotificationHandlerFn, Protocol, RequestHandlerFn};
pub use options::{
    ProgressCallback, ProtocolOptions, RequestOptions, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_TASK_POLL_INTERVAL,
};
pub use tasks::{
    InMemoryTaskMessageQueue, InMemoryTaskStore, TaskContext, TaskMessageQueue, TaskPollEvent,
    TaskStore,
};
