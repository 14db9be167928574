//! Convenient imports for the common surface.
//!
//! # Example
//!
//! ```rust
//! use mcpflow::prelude::*;
//! ```

pub use mcpflow_core::capability::{
    is_version_supported, negotiate_version, Capabilities, Implementation, InitializeParams,
    InitializeResult, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
pub use mcpflow_core::error::{codes, JsonRpcError, McpError};
pub use mcpflow_core::methods::{methods, notifications};
pub use mcpflow_core::protocol::{
    ErrorResponse, Message, Notification, Request, RequestId, Response,
};
pub use mcpflow_core::types::{
    CallToolParams, CallToolResult, CancelTaskParams, CancelledParams, Content, CreateTaskResult,
    EmptyResult, GetTaskParams, ListTasksParams, ListTasksResult, ListToolsParams,
    ListToolsResult, Progress, ProgressParams, QueuedMessage, QueuedMessageKind, Task,
    TaskMetadata, TaskResultParams, TaskStatus, Tool,
};
pub use mcpflow_engine::{
    CancellationToken, InMemoryTaskMessageQueue, InMemoryTaskStore, Protocol, ProtocolOptions,
    RequestContext, RequestOptions, TaskContext, TaskMessageQueue, TaskPollEvent, TaskStore,
};
pub use mcpflow_transport::{MemoryTransport, Transport, TransportError, TransportMetadata};
