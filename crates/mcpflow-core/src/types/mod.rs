//! Typed MCP payloads.
//!
//! One module per method family, mirroring the protocol's surface: content
//! blocks, tools, resources, prompts, sampling, elicitation, completion,
//! logging, roots, tasks, and the built-in notification params.

mod completion;
mod content;
mod elicitation;
mod logging;
mod notification;
mod prompt;
mod resource;
mod root;
mod sampling;
mod task;
mod tool;

pub use completion::{
    CompleteParams, CompleteResult, Completion, CompletionArgument, CompletionRef,
};
pub use content::{Content, ImageContent, ResourceContent, Role, TextContent};
pub use elicitation::{ElicitAction, ElicitParams, ElicitResult};
pub use logging::{LogMessageParams, LoggingLevel, SetLevelParams};
pub use notification::{CancelledParams, EmptyResult, Progress, ProgressParams};
pub use prompt::{
    GetPromptParams, GetPromptResult, ListPromptsParams, ListPromptsResult, Prompt,
    PromptArgument, PromptMessage,
};
pub use resource::{
    ListResourceTemplatesResult, ListResourcesParams, ListResourcesResult, ReadResourceParams,
    ReadResourceResult, Resource, ResourceContents, ResourceTemplate, SubscribeParams,
};
pub use root::{ListRootsResult, Root};
pub use sampling::{
    CreateMessageParams, CreateMessageResult, ModelHint, ModelPreferences, SamplingMessage,
};
pub use task::{
    CancelTaskParams, CreateTaskResult, GetTaskParams, ListTasksParams, ListTasksResult,
    QueuedMessage, QueuedMessageKind, Task, TaskMetadata, TaskResultParams, TaskStatus,
};
pub use tool::{CallToolParams, CallToolResult, ListToolsParams, ListToolsResult, Tool};
