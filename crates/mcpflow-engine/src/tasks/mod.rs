//! The task subsystem.
//!
//! Tasks are server-owned long-running operations. The engine talks to two
//! pluggable collaborators: a [`TaskStore`] holding task state and results,
//! and a [`TaskMessageQueue`] carrying the per-task side channel: messages
//! a server must send to its peer *within* an in-flight task.
//!
//! In-memory implementations live in [`memory`]; both traits are
//! object-safe so stores can be shared across sessions and swapped for
//! durable implementations.

mod handlers;
mod memory;
mod stream;

pub use memory::{InMemoryTaskMessageQueue, InMemoryTaskStore};
pub use stream::TaskPollEvent;

pub(crate) use handlers::register_builtin_task_handlers;

use crate::context::RequestContext;
use crate::engine::Protocol;
use async_trait::async_trait;
use mcpflow_core::error::McpError;
use mcpflow_core::protocol::RequestId;
use mcpflow_core::types::{ListTasksResult, QueuedMessage, Task, TaskMetadata, TaskStatus};
use mcpflow_transport::Transport;
use serde_json::Value;
use std::sync::Arc;

/// Storage contract for task state and results.
///
/// Implementations must make every operation atomic with respect to
/// concurrent sessions. Distinct store instances are fully isolated.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task for a task-augmented request.
    ///
    /// The implementation generates a fresh task id, sets `status` to
    /// `working` and `createdAt` to now, and may clamp the requested TTL.
    async fn create_task(
        &self,
        metadata: TaskMetadata,
        originating_request_id: RequestId,
        originating_request: Value,
        session_id: Option<&str>,
    ) -> Result<Task, McpError>;

    /// Fetch a task, or `None` if it does not exist (or is invisible to the
    /// given session).
    async fn get_task(&self, task_id: &str, session_id: Option<&str>)
        -> Result<Option<Task>, McpError>;

    /// Advance a task's status.
    ///
    /// Fails with invalid-params when the task is unknown or already
    /// terminal.
    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task, McpError>;

    /// Atomically set a terminal status and record the task's result.
    async fn store_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: Option<&str>,
    ) -> Result<Task, McpError>;

    /// Fetch a task's stored result. Fails when no result was stored.
    async fn get_task_result(
        &self,
        task_id: &str,
        session_id: Option<&str>,
    ) -> Result<Value, McpError>;

    /// List tasks visible to the session, paginated by an opaque cursor.
    async fn list_tasks(
        &self,
        cursor: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<ListTasksResult, McpError>;

    /// Move a task to `cancelled` iff it is not already terminal.
    ///
    /// Returns whether a transition happened.
    async fn cancel_task(&self, task_id: &str, session_id: Option<&str>) -> Result<bool, McpError>;
}

/// The per-task side-channel FIFO.
#[async_trait]
pub trait TaskMessageQueue: Send + Sync {
    /// Append a message to the task's queue.
    ///
    /// Bounded per task: when `max_size` is reached the enqueue fails.
    async fn enqueue(
        &self,
        task_id: &str,
        message: QueuedMessage,
        session_id: Option<&str>,
        max_size: Option<usize>,
    ) -> Result<(), McpError>;

    /// Pop the oldest message, if any.
    async fn dequeue(
        &self,
        task_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<QueuedMessage>, McpError>;

    /// Drain the task's queue, oldest first. Used on cancel and cleanup.
    async fn dequeue_all(
        &self,
        task_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<QueuedMessage>, McpError>;
}

/// Request-scoped view over the task store.
///
/// Handlers own their task's lifecycle through this view; every
/// status-advancing call also emits `notifications/tasks/status` through the
/// owning protocol, keeping store implementations notification-free.
pub struct TaskContext<T: Transport + 'static> {
    pub(crate) protocol: Protocol<T>,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) session_id: Option<String>,
    pub(crate) originating_request_id: RequestId,
    pub(crate) originating_request: Value,
}

impl<T: Transport + 'static> TaskContext<T> {
    pub(crate) fn for_request(
        protocol: Protocol<T>,
        store: Arc<dyn TaskStore>,
        ctx: &RequestContext<T>,
    ) -> Self {
        Self {
            protocol,
            store,
            session_id: ctx.session_id.clone(),
            originating_request_id: ctx.request_id.clone(),
            originating_request: ctx.raw_request.clone(),
        }
    }

    /// Create a task for the current request.
    pub async fn create_task(&self, metadata: TaskMetadata) -> Result<Task, McpError> {
        self.store
            .create_task(
                metadata,
                self.originating_request_id.clone(),
                self.originating_request.clone(),
                self.session_id.as_deref(),
            )
            .await
    }

    /// Fetch a task.
    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, McpError> {
        self.store.get_task(task_id, self.session_id.as_deref()).await
    }

    /// Advance a task's status and broadcast the change.
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
    ) -> Result<Task, McpError> {
        let task = self
            .store
            .update_task_status(task_id, status, status_message, self.session_id.as_deref())
            .await?;
        self.protocol.send_task_status(&task).await;
        Ok(task)
    }

    /// Store a terminal status and result, and broadcast the change.
    pub async fn store_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
    ) -> Result<Task, McpError> {
        let task = self
            .store
            .store_task_result(task_id, status, result, self.session_id.as_deref())
            .await?;
        self.protocol.send_task_status(&task).await;
        Ok(task)
    }

    /// Complete a task successfully.
    pub async fn complete(&self, task_id: &str, result: Value) -> Result<Task, McpError> {
        self.store_result(task_id, TaskStatus::Completed, result).await
    }

    /// Fail a task, storing the failure payload as its result.
    pub async fn fail(&self, task_id: &str, result: Value) -> Result<Task, McpError> {
        self.store_result(task_id, TaskStatus::Failed, result).await
    }
}

impl<T: Transport + 'static> std::fmt::Debug for TaskContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("session_id", &self.session_id)
            .field("originating_request_id", &self.originating_request_id)
            .finish_non_exhaustive()
    }
}
