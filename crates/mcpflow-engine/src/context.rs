//! Cancellation tokens and the per-request handler context.

use crate::engine::Protocol;
use crate::options::RequestOptions;
use crate::tasks::TaskContext;
use mcpflow_core::error::McpError;
use mcpflow_core::methods::notifications;
use mcpflow_core::protocol::RequestId;
use mcpflow_core::types::QueuedMessage;
use mcpflow_transport::Transport;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// A cancellation token shared between the engine and a handler.
///
/// Remote `notifications/cancelled` messages and caller-side aborts both
/// flip the same token. Handlers observe it via [`CancellationToken::is_cancelled`]
/// or await [`CancellationToken::cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Request cancellation carrying a reason.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.inner.reason.lock() {
            *slot = Some(reason.into());
        }
        self.cancel();
    }

    /// The cancellation reason, if one was given.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().ok().and_then(|r| r.clone())
    }

    /// Wait for cancellation.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                break;
            }
            notified.await;
        }
    }

    /// The abort error corresponding to this token's state.
    #[must_use]
    pub fn abort_error(&self) -> McpError {
        McpError::Aborted {
            reason: self.reason(),
        }
    }
}

/// Per-request state handed to a request handler.
///
/// The context is short-lived: it exists for the duration of one handler
/// invocation and carries everything the handler needs to talk back through
/// the engine: notifications, nested requests (pre-bound to this request's
/// related task), progress reporting, and the request-scoped task view.
pub struct RequestContext<T: Transport + 'static> {
    pub(crate) protocol: Protocol<T>,
    /// Id of the request being handled.
    pub request_id: RequestId,
    /// Session identity of the underlying transport, if any.
    pub session_id: Option<String>,
    /// The request's `_meta` object, if present.
    pub meta: Option<Value>,
    /// Task id this request executes under (`_meta.taskId`), if any.
    pub task_id: Option<String>,
    /// Related task marker (`_meta.relatedTask.taskId`), if any.
    pub related_task: Option<String>,
    pub(crate) signal: CancellationToken,
    pub(crate) progress_token: Option<i64>,
    pub(crate) raw_request: Value,
}

impl<T: Transport + 'static> Clone for RequestContext<T> {
    fn clone(&self) -> Self {
        Self {
            protocol: self.protocol.clone(),
            request_id: self.request_id.clone(),
            session_id: self.session_id.clone(),
            meta: self.meta.clone(),
            task_id: self.task_id.clone(),
            related_task: self.related_task.clone(),
            signal: self.signal.clone(),
            progress_token: self.progress_token,
            raw_request: self.raw_request.clone(),
        }
    }
}

impl<T: Transport + 'static> RequestContext<T> {
    /// Check if this request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Wait until this request is cancelled.
    pub async fn cancelled(&self) {
        self.signal.cancelled().await;
    }

    /// The cancellation token for this request.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.signal
    }

    /// The protocol this request arrived on.
    #[must_use]
    pub fn protocol(&self) -> &Protocol<T> {
        &self.protocol
    }

    /// Send a notification to the peer.
    ///
    /// When this request carries a related task, the notification travels
    /// through that task's side-channel queue instead of the transport.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        if let Some(task_id) = &self.related_task {
            let notification =
                mcpflow_core::protocol::Notification::with_params(
                    method.to_string(),
                    params.unwrap_or(Value::Object(serde_json::Map::new())),
                );
            let body = serde_json::to_value(&notification)?;
            return self
                .protocol
                .enqueue_task_message(task_id, QueuedMessage::notification(body), self.session_id.as_deref())
                .await;
        }
        self.protocol
            .notify_related(method, params, Some(&self.request_id))
            .await
    }

    /// Send a request to the peer, pre-bound to this request's related task.
    pub async fn send_request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        mut options: RequestOptions,
    ) -> Result<R, McpError> {
        if options.related_task.is_none() {
            options.related_task = self.related_task.clone();
        }
        self.protocol.request(method, params, options).await
    }

    /// Report progress for this request.
    ///
    /// Silently succeeds when the request carried no progress token.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<&str>,
    ) -> Result<(), McpError> {
        let Some(token) = self.progress_token else {
            return Ok(());
        };
        let mut params = serde_json::json!({
            "progressToken": token,
            "progress": progress,
        });
        if let Some(total) = total {
            params["total"] = Value::from(total);
        }
        if let Some(message) = message {
            params["message"] = Value::from(message);
        }
        self.send_notification(notifications::PROGRESS, Some(params))
            .await
    }

    /// The request-scoped task view, when a task store is configured.
    #[must_use]
    pub fn tasks(&self) -> Option<TaskContext<T>> {
        self.protocol.task_context(self)
    }
}

impl<T: Transport + 'static> std::fmt::Debug for RequestContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("session_id", &self.session_id)
            .field("task_id", &self.task_id)
            .field("related_task", &self.related_task)
            .field("is_cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn token_reason() {
        let token = CancellationToken::new();
        token.cancel_with_reason("user clicked stop");
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("user clicked stop"));
        assert!(token.abort_error().to_string().contains("user clicked stop"));
    }

    #[tokio::test]
    async fn token_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
