//! # mcpflow-core
//!
//! Core types for the mcpflow Model Context Protocol runtime:
//!
//! - **Protocol envelopes**: strict JSON-RPC 2.0 request/response/error/
//!   notification framing with `_meta` helpers
//! - **MCP payloads**: tools, resources, prompts, tasks, sampling,
//!   elicitation, completion, logging, roots
//! - **Capabilities**: the symmetric capability record, the method→capability
//!   map, and protocol-version negotiation
//! - **Errors**: the closed [`error::McpError`] taxonomy with wire
//!   round-tripping via [`error::JsonRpcError`]
//!
//! This crate is runtime-agnostic and does not depend on any async executor.
//!
//! # Protocol Version
//!
//! This crate implements MCP protocol version **2025-11-25**.
//!
//! # Example
//!
//! ```rust
//! use mcpflow_core::{
//!     capability::{Capabilities, Implementation},
//!     protocol::{Message, Request},
//! };
//!
//! let caps = Capabilities::new()
//!     .with_tools()
//!     .with_tasks_for(["tools/call"]);
//! assert!(caps.ensure_peer_capability("tools/call").is_ok());
//!
//! let request = Request::new("ping", 1);
//! let message = Message::from(request);
//! assert!(message.is_request());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

pub mod capability;
pub mod error;
pub mod methods;
pub mod protocol;
pub mod types;

// Re-export commonly used types at the crate root
pub use capability::{
    is_version_supported, negotiate_version, Capabilities, Implementation, InitializeParams,
    InitializeResult, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
pub use error::{JsonRpcError, McpError};
pub use protocol::{ErrorResponse, Message, Notification, Request, RequestId, Response};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use mcpflow_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::capability::{
        is_version_supported, negotiate_version, Capabilities, Implementation, InitializeParams,
        InitializeResult, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
    };
    pub use crate::error::{codes, JsonRpcError, McpError};
    pub use crate::methods::{methods, notifications};
    pub use crate::protocol::{
        ErrorResponse, Message, Notification, Request, RequestId, Response,
    };
    pub use crate::types::{
        CallToolParams, CallToolResult, CancelTaskParams, CancelledParams, Content,
        CreateTaskResult, EmptyResult, GetTaskParams, ListTasksParams, ListTasksResult, Progress,
        ProgressParams, QueuedMessage, QueuedMessageKind, Task, TaskMetadata, TaskResultParams,
        TaskStatus, Tool,
    };
}
