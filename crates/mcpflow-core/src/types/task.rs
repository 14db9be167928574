//! Task types for long-running operations.
//!
//! A task is a server-owned, addressable operation with lifecycle status and
//! an optional stored result. Tasks are created by augmenting a request with
//! `params.task`, polled via `tasks/get`, and resolved via `tasks/result`.
//! Messages a server must send *within* an in-flight task travel through a
//! per-task side-channel queue as [`QueuedMessage`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The lifecycle status of a task.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: once entered, no
/// further transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task is executing.
    Working,
    /// The task is blocked on user input (e.g. an elicitation).
    InputRequired,
    /// The task finished successfully. Terminal.
    Completed,
    /// The task finished with an error. Terminal.
    Failed,
    /// The task was cancelled. Terminal.
    Cancelled,
}

impl TaskStatus {
    /// Check if the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::InputRequired => write!(f, "input_required"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The state of a task as exchanged on the wire.
///
/// This same shape is carried by `tasks/get` responses,
/// `CreateTaskResult.task`, and `notifications/tasks/status` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Diagnostic message accompanying the status.
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Retention duration in milliseconds from creation; absent means
    /// unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Suggested polling interval in milliseconds.
    #[serde(rename = "pollInterval", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
    /// When the task was created.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// When the task last changed.
    #[serde(rename = "lastUpdatedAt", skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Free-form protocol metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Task {
    /// Create a new working task.
    #[must_use]
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Working,
            status_message: None,
            ttl: None,
            poll_interval: None,
            created_at: Utc::now(),
            last_updated_at: None,
            meta: None,
        }
    }

    /// Check if the task is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The instant this task expires, if a TTL was set.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = self.ttl?;
        Some(self.created_at + chrono::Duration::milliseconds(ttl as i64))
    }
}

/// Task augmentation carried under `params.task` on a task-creating request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Requested retention duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl TaskMetadata {
    /// Request task augmentation with a retention TTL.
    #[must_use]
    pub const fn with_ttl(ttl: u64) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Immediate response to a task-augmented request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskResult {
    /// The created task.
    pub task: Task,
}

/// Parameters for `tasks/get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetTaskParams {
    /// The task to fetch.
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Parameters for `tasks/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListTasksParams {
    /// Pagination cursor from a previous response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Result of `tasks/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListTasksResult {
    /// The known tasks.
    pub tasks: Vec<Task>,
    /// Cursor for the next page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for `tasks/cancel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelTaskParams {
    /// The task to cancel.
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Parameters for `tasks/result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultParams {
    /// The task whose result to fetch.
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// The kind of message held in a task's side-channel queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuedMessageKind {
    /// A request the task owner sent to the peer.
    Request,
    /// A reply to a request the peer sent within the task.
    Response,
    /// A notification emitted within the task.
    Notification,
    /// An error reply emitted within the task.
    Error,
}

/// The unit of a task's side-channel queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// What kind of message this is.
    #[serde(rename = "type")]
    pub kind: QueuedMessageKind,
    /// The JSON-RPC message body.
    pub message: Value,
    /// When the message was enqueued.
    pub timestamp: DateTime<Utc>,
}

impl QueuedMessage {
    /// Wrap a message body with the given kind, stamped now.
    #[must_use]
    pub fn new(kind: QueuedMessageKind, message: Value) -> Self {
        Self {
            kind,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Queue a request body.
    #[must_use]
    pub fn request(message: Value) -> Self {
        Self::new(QueuedMessageKind::Request, message)
    }

    /// Queue a response body.
    #[must_use]
    pub fn response(message: Value) -> Self {
        Self::new(QueuedMessageKind::Response, message)
    }

    /// Queue a notification body.
    #[must_use]
    pub fn notification(message: Value) -> Self {
        Self::new(QueuedMessageKind::Notification, message)
    }

    /// Queue an error-reply body.
    #[must_use]
    pub fn error(message: Value) -> Self {
        Self::new(QueuedMessageKind::Error, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(!TaskStatus::Working.is_terminal());
        assert!(!TaskStatus::InputRequired.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InputRequired).unwrap(),
            "\"input_required\""
        );
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"working\"").unwrap(),
            TaskStatus::Working
        );
    }

    #[test]
    fn task_wire_shape() {
        let task = Task::new("t1");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["status"], "working");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("ttl").is_none());
    }

    #[test]
    fn expiry_from_ttl() {
        let mut task = Task::new("t1");
        assert!(task.expires_at().is_none());
        task.ttl = Some(60_000);
        let expires = task.expires_at().unwrap();
        assert_eq!(expires - task.created_at, chrono::Duration::seconds(60));
    }

    #[test]
    fn queued_message_kinds() {
        let queued = QueuedMessage::request(serde_json::json!({"id": 99}));
        assert_eq!(queued.kind, QueuedMessageKind::Request);
        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["type"], "request");
    }
}
