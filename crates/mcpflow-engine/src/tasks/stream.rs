//! Polling stream over a task-augmented request.

use crate::engine::Protocol;
use crate::options::RequestOptions;
use mcpflow_core::error::McpError;
use mcpflow_core::methods::methods;
use mcpflow_core::types::{CreateTaskResult, Task, TaskMetadata, TaskStatus};
use mcpflow_transport::Transport;
use futures::Stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::trace;

/// An event on a task polling stream.
#[derive(Debug)]
pub enum TaskPollEvent {
    /// The task was created by the augmented request.
    Created(Task),
    /// A status observation from `tasks/get`.
    Status(Task),
    /// The task's stored result.
    Result(Value),
    /// The stream ended in failure.
    Error(McpError),
}

enum Phase {
    Create {
        method: String,
        params: Option<Value>,
        options: RequestOptions,
    },
    Poll {
        task_id: String,
        interval: Duration,
        first: bool,
    },
    FetchResult {
        task_id: String,
    },
    Finished,
}

struct PollState<T: Transport + 'static> {
    protocol: Protocol<T>,
    signal: Option<crate::context::CancellationToken>,
    buffered: VecDeque<TaskPollEvent>,
    phase: Phase,
}

impl<T: Transport + 'static> Protocol<T> {
    /// Run a task-augmented request as a lazy polling stream.
    ///
    /// Yields `Created(task)` after the augmented call, a `Status(task)`
    /// observation per poll, and ends with either `Result(value)` (for
    /// `completed` and `input_required` tasks, whose result the server has
    /// staged) or `Error(..)` (for `failed`/`cancelled` tasks, transport
    /// failures, and caller aborts). The poll delay follows the task's
    /// `pollInterval` hint, falling back to the protocol default.
    pub fn request_task_stream(
        &self,
        method: &str,
        params: Option<Value>,
        mut options: RequestOptions,
    ) -> impl Stream<Item = TaskPollEvent> + Send {
        if options.task.is_none() {
            options.task = Some(TaskMetadata::default());
        }
        let state = PollState {
            protocol: self.clone(),
            signal: options.signal.clone(),
            buffered: VecDeque::new(),
            phase: Phase::Create {
                method: method.to_string(),
                params,
                options,
            },
        };
        futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.buffered.pop_front() {
                    return Some((event, state));
                }
                if matches!(state.phase, Phase::Finished) {
                    return None;
                }
                step(&mut state).await;
            }
        })
    }
}

async fn step<T: Transport + 'static>(state: &mut PollState<T>) {
    let phase = std::mem::replace(&mut state.phase, Phase::Finished);
    match phase {
        Phase::Create {
            method,
            params,
            options,
        } => {
            let interval_default =
                state.protocol.options().default_task_poll_interval;
            match state
                .protocol
                .request::<CreateTaskResult>(&method, params, options)
                .await
            {
                Ok(created) => {
                    let task = created.task;
                    let interval = poll_interval(&task, interval_default);
                    trace!(task_id = %task.task_id, ?interval, "task created");
                    state.phase = Phase::Poll {
                        task_id: task.task_id.clone(),
                        interval,
                        first: true,
                    };
                    state.buffered.push_back(TaskPollEvent::Created(task));
                }
                Err(err) => {
                    state.buffered.push_back(TaskPollEvent::Error(err));
                }
            }
        }
        Phase::Poll {
            task_id,
            interval,
            first,
        } => {
            if !first && !sleep_or_abort(state, interval).await {
                return;
            }
            let params = serde_json::json!({ "taskId": task_id });
            match state
                .protocol
                .request::<Task>(methods::TASKS_GET, Some(params), poll_options(state))
                .await
            {
                Ok(task) => {
                    let interval = poll_interval(&task, interval);
                    let status = task.status;
                    state.buffered.push_back(TaskPollEvent::Status(task));
                    state.phase = match status {
                        TaskStatus::Working => Phase::Poll {
                            task_id,
                            interval,
                            first: false,
                        },
                        // the server stages a result for input_required too
                        TaskStatus::Completed | TaskStatus::InputRequired => {
                            Phase::FetchResult { task_id }
                        }
                        TaskStatus::Failed | TaskStatus::Cancelled => {
                            state.buffered.push_back(TaskPollEvent::Error(
                                McpError::internal(format!("Task failed: {status}")),
                            ));
                            Phase::Finished
                        }
                    };
                }
                Err(err) => {
                    state.buffered.push_back(TaskPollEvent::Error(err));
                }
            }
        }
        Phase::FetchResult { task_id } => {
            let params = serde_json::json!({ "taskId": task_id });
            match state
                .protocol
                .request_value(methods::TASKS_RESULT, Some(params), poll_options(state))
                .await
            {
                Ok(value) => state.buffered.push_back(TaskPollEvent::Result(value)),
                Err(err) => state.buffered.push_back(TaskPollEvent::Error(err)),
            }
        }
        Phase::Finished => {}
    }
}

fn poll_options<T: Transport + 'static>(state: &PollState<T>) -> RequestOptions {
    let mut options = RequestOptions::new();
    if let Some(signal) = &state.signal {
        options = options.signal(signal.clone());
    }
    options
}

fn poll_interval(task: &Task, fallback: Duration) -> Duration {
    task.poll_interval
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}

/// Sleep between polls; returns false (buffering an abort) when the caller's
/// signal fires first.
async fn sleep_or_abort<T: Transport + 'static>(
    state: &mut PollState<T>,
    interval: Duration,
) -> bool {
    let Some(signal) = state.signal.clone() else {
        tokio::time::sleep(interval).await;
        return true;
    };
    tokio::select! {
        () = tokio::time::sleep(interval) => true,
        () = signal.cancelled() => {
            state.buffered.push_back(TaskPollEvent::Error(signal.abort_error()));
            state.phase = Phase::Finished;
            false
        }
    }
}
