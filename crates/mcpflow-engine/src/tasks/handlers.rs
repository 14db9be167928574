//! Built-in `tasks/*` request handlers.
//!
//! Registered by the engine iff a task store is configured.

use crate::engine::Protocol;
use mcpflow_core::error::McpError;
use mcpflow_core::methods::methods;
use mcpflow_core::types::{
    CancelTaskParams, GetTaskParams, ListTasksParams, ListTasksResult, QueuedMessageKind, Task,
    TaskResultParams,
};
use mcpflow_transport::Transport;
use serde_json::Value;
use tracing::debug;

pub(crate) fn register_builtin_task_handlers<T: Transport + 'static>(
    protocol: &Protocol<T>,
) -> Result<(), McpError> {
    let get = protocol.clone();
    protocol.set_request_handler_raw(
        methods::TASKS_GET,
        handler(move |params: GetTaskParams, session: Option<String>| {
            let protocol = get.clone();
            async move {
                let store = require_store(&protocol)?;
                let task = store
                    .get_task(&params.task_id, session.as_deref())
                    .await?
                    .ok_or_else(|| {
                        McpError::invalid_params(format!("unknown task: {}", params.task_id))
                    })?;
                serde_json::to_value(task).map_err(McpError::from)
            }
        }),
    )?;

    let list = protocol.clone();
    protocol.set_request_handler_raw(
        methods::TASKS_LIST,
        handler(move |params: ListTasksParams, session: Option<String>| {
            let protocol = list.clone();
            async move {
                let store = require_store(&protocol)?;
                let result: ListTasksResult = store
                    .list_tasks(params.cursor.as_deref(), session.as_deref())
                    .await?;
                serde_json::to_value(result).map_err(McpError::from)
            }
        }),
    )?;

    let result_protocol = protocol.clone();
    protocol.set_request_handler_raw(
        methods::TASKS_RESULT,
        handler(move |params: TaskResultParams, session: Option<String>| {
            let protocol = result_protocol.clone();
            async move {
                let store = require_store(&protocol)?;
                store
                    .get_task_result(&params.task_id, session.as_deref())
                    .await
            }
        }),
    )?;

    let cancel = protocol.clone();
    protocol.set_request_handler_raw(
        methods::TASKS_CANCEL,
        handler(move |params: CancelTaskParams, session: Option<String>| {
            let protocol = cancel.clone();
            async move { cancel_task(&protocol, &params.task_id, session.as_deref()).await }
        }),
    )?;

    Ok(())
}

/// Adapt a typed `(params, session_id)` closure into the raw handler shape.
fn handler<T, P, F, Fut>(f: F) -> crate::engine::RequestHandlerFn<T>
where
    T: Transport + 'static,
    P: serde::de::DeserializeOwned + Send + 'static,
    F: Fn(P, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, McpError>> + Send + 'static,
{
    std::sync::Arc::new(move |req, ctx| {
        let raw = req
            .params
            .clone()
            .unwrap_or(Value::Object(serde_json::Map::new()));
        let parsed = serde_json::from_value::<P>(raw).map_err(|err| {
            McpError::invalid_params(format!("invalid params for {}: {err}", req.method))
        });
        let fut = match parsed {
            Ok(params) => Ok(f(params, ctx.session_id.clone())),
            Err(err) => Err(err),
        };
        Box::pin(async move { fut?.await })
    })
}

fn require_store<T: Transport + 'static>(
    protocol: &Protocol<T>,
) -> Result<std::sync::Arc<dyn super::TaskStore>, McpError> {
    protocol
        .task_store()
        .ok_or_else(|| McpError::internal("no task store configured"))
}

/// `tasks/cancel`: transition to cancelled, drain the side channel, fail any
/// parked side-channel requests, and broadcast the status change.
async fn cancel_task<T: Transport + 'static>(
    protocol: &Protocol<T>,
    task_id: &str,
    session_id: Option<&str>,
) -> Result<Value, McpError> {
    let store = require_store(protocol)?;
    let task = store
        .get_task(task_id, session_id)
        .await?
        .ok_or_else(|| McpError::invalid_params(format!("unknown task: {task_id}")))?;
    if task.is_terminal() {
        return Err(McpError::invalid_params(format!(
            "task {task_id} is already {}",
            task.status
        )));
    }

    store.cancel_task(task_id, session_id).await?;

    if let Some(queue) = protocol.task_queue() {
        let drained = queue.dequeue_all(task_id, session_id).await?;
        debug!(task_id, drained = drained.len(), "drained task queue on cancel");
        for queued in drained {
            if queued.kind != QueuedMessageKind::Request {
                continue;
            }
            if let Some(id) = queued.message.get("id").and_then(Value::as_i64) {
                protocol.resolve_parked_request(
                    id,
                    McpError::internal("Task cancelled or completed"),
                );
            }
        }
    }

    let cancelled: Task = store
        .get_task(task_id, session_id)
        .await?
        .ok_or_else(|| McpError::internal(format!("task {task_id} vanished during cancel")))?;
    protocol.send_task_status(&cancelled).await;
    serde_json::to_value(cancelled).map_err(McpError::from)
}
