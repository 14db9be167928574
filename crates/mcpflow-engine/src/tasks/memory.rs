//! In-memory task store and side-channel queue.
//!
//! Suitable for single-process servers and tests. Distinct instances share
//! no state; within an instance, tasks are scoped to the session that
//! created them.

use super::{TaskMessageQueue, TaskStore};
use async_trait::async_trait;
use chrono::Utc;
use mcpflow_core::error::McpError;
use mcpflow_core::protocol::RequestId;
use mcpflow_core::types::{ListTasksResult, QueuedMessage, Task, TaskMetadata, TaskStatus};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug)]
struct TaskRecord {
    task: Task,
    session_id: Option<String>,
    result: Option<Value>,
    #[allow(dead_code)]
    originating_request_id: RequestId,
    #[allow(dead_code)]
    originating_request: Value,
}

impl TaskRecord {
    fn visible_to(&self, session_id: Option<&str>) -> bool {
        self.session_id.as_deref() == session_id
    }

    fn expired(&self) -> bool {
        self.task
            .expires_at()
            .is_some_and(|expires| expires <= Utc::now())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<String, TaskRecord>,
    order: Vec<String>,
}

impl StoreState {
    fn evict_expired(&mut self) {
        let records = &mut self.records;
        records.retain(|_, record| !record.expired());
        self.order.retain(|id| records.contains_key(id));
    }
}

/// An in-memory [`TaskStore`].
///
/// TTL eviction is lazy: expired tasks are swept on every access and via
/// [`InMemoryTaskStore::cleanup`].
#[derive(Debug)]
pub struct InMemoryTaskStore {
    state: RwLock<StoreState>,
    default_ttl: Option<u64>,
    poll_interval_hint: Option<u64>,
    page_size: usize,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            default_ttl: None,
            poll_interval_hint: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Apply this TTL (milliseconds) to tasks created without one.
    #[must_use]
    pub fn default_ttl(mut self, ttl_ms: u64) -> Self {
        self.default_ttl = Some(ttl_ms);
        self
    }

    /// Advertise this polling interval (milliseconds) on created tasks.
    #[must_use]
    pub fn poll_interval_hint(mut self, interval_ms: u64) -> Self {
        self.poll_interval_hint = Some(interval_ms);
        self
    }

    /// Set the page size for `tasks/list`.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sweep expired tasks now.
    pub fn cleanup(&self) {
        if let Ok(mut state) = self.state.write() {
            state.evict_expired();
        }
    }

    fn lock_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, McpError> {
        self.state
            .write()
            .map_err(|_| McpError::internal("task store lock poisoned"))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(
        &self,
        metadata: TaskMetadata,
        originating_request_id: RequestId,
        originating_request: Value,
        session_id: Option<&str>,
    ) -> Result<Task, McpError> {
        let mut state = self.lock_write()?;
        state.evict_expired();

        let mut task = Task::new(uuid::Uuid::new_v4().to_string());
        task.ttl = metadata.ttl.or(self.default_ttl);
        task.poll_interval = self.poll_interval_hint;

        let record = TaskRecord {
            task: task.clone(),
            session_id: session_id.map(String::from),
            result: None,
            originating_request_id,
            originating_request,
        };
        state.order.push(task.task_id.clone());
        state.records.insert(task.task_id.clone(), record);
        Ok(task)
    }

    async fn get_task(
        &self,
        task_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<Task>, McpError> {
        let mut state = self.lock_write()?;
        state.evict_expired();
        Ok(state
            .records
            .get(task_id)
            .filter(|record| record.visible_to(session_id))
            .map(|record| record.task.clone()))
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task, McpError> {
        let mut state = self.lock_write()?;
        state.evict_expired();
        let record = state
            .records
            .get_mut(task_id)
            .filter(|record| record.visible_to(session_id))
            .ok_or_else(|| McpError::invalid_params(format!("unknown task: {task_id}")))?;
        if record.task.is_terminal() {
            return Err(McpError::invalid_params(format!(
                "task {task_id} is already {}",
                record.task.status
            )));
        }
        record.task.status = status;
        record.task.status_message = status_message;
        record.task.last_updated_at = Some(Utc::now());
        Ok(record.task.clone())
    }

    async fn store_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: Option<&str>,
    ) -> Result<Task, McpError> {
        if !status.is_terminal() {
            return Err(McpError::invalid_params(format!(
                "store_task_result requires a terminal status, got {status}"
            )));
        }
        let mut state = self.lock_write()?;
        state.evict_expired();
        let record = state
            .records
            .get_mut(task_id)
            .filter(|record| record.visible_to(session_id))
            .ok_or_else(|| McpError::invalid_params(format!("unknown task: {task_id}")))?;
        if record.task.is_terminal() {
            return Err(McpError::invalid_params(format!(
                "task {task_id} is already {}",
                record.task.status
            )));
        }
        record.task.status = status;
        record.task.last_updated_at = Some(Utc::now());
        record.result = Some(result);
        Ok(record.task.clone())
    }

    async fn get_task_result(
        &self,
        task_id: &str,
        session_id: Option<&str>,
    ) -> Result<Value, McpError> {
        let mut state = self.lock_write()?;
        state.evict_expired();
        state
            .records
            .get(task_id)
            .filter(|record| record.visible_to(session_id))
            .ok_or_else(|| McpError::invalid_params(format!("unknown task: {task_id}")))?
            .result
            .clone()
            .ok_or_else(|| {
                McpError::invalid_params(format!("task {task_id} has no stored result"))
            })
    }

    async fn list_tasks(
        &self,
        cursor: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<ListTasksResult, McpError> {
        let mut state = self.lock_write()?;
        state.evict_expired();

        let offset = match cursor {
            None => 0,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| McpError::invalid_params(format!("invalid cursor: {raw}")))?,
        };

        let visible: Vec<Task> = state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|record| record.visible_to(session_id))
            .map(|record| record.task.clone())
            .collect();

        if offset > visible.len() {
            return Err(McpError::invalid_params(format!(
                "invalid cursor: {offset}"
            )));
        }

        let page: Vec<Task> = visible[offset..]
            .iter()
            .take(self.page_size)
            .cloned()
            .collect();
        let next = offset + page.len();
        let next_cursor = (next < visible.len()).then(|| next.to_string());

        Ok(ListTasksResult {
            tasks: page,
            next_cursor,
        })
    }

    async fn cancel_task(&self, task_id: &str, session_id: Option<&str>) -> Result<bool, McpError> {
        let mut state = self.lock_write()?;
        state.evict_expired();
        let Some(record) = state
            .records
            .get_mut(task_id)
            .filter(|record| record.visible_to(session_id))
        else {
            return Ok(false);
        };
        if record.task.is_terminal() {
            return Ok(false);
        }
        record.task.status = TaskStatus::Cancelled;
        record.task.last_updated_at = Some(Utc::now());
        Ok(true)
    }
}

/// An in-memory [`TaskMessageQueue`] of per-task FIFOs.
#[derive(Debug, Default)]
pub struct InMemoryTaskMessageQueue {
    queues: RwLock<HashMap<String, VecDeque<QueuedMessage>>>,
}

impl InMemoryTaskMessageQueue {
    /// Create an empty queue set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, VecDeque<QueuedMessage>>>, McpError>
    {
        self.queues
            .write()
            .map_err(|_| McpError::internal("task queue lock poisoned"))
    }
}

#[async_trait]
impl TaskMessageQueue for InMemoryTaskMessageQueue {
    async fn enqueue(
        &self,
        task_id: &str,
        message: QueuedMessage,
        _session_id: Option<&str>,
        max_size: Option<usize>,
    ) -> Result<(), McpError> {
        let mut queues = self.lock_write()?;
        let queue = queues.entry(task_id.to_string()).or_default();
        if let Some(max) = max_size {
            if queue.len() >= max {
                return Err(McpError::internal(format!(
                    "task message queue full for {task_id} (max {max})"
                )));
            }
        }
        queue.push_back(message);
        Ok(())
    }

    async fn dequeue(
        &self,
        task_id: &str,
        _session_id: Option<&str>,
    ) -> Result<Option<QueuedMessage>, McpError> {
        let mut queues = self.lock_write()?;
        Ok(queues.get_mut(task_id).and_then(VecDeque::pop_front))
    }

    async fn dequeue_all(
        &self,
        task_id: &str,
        _session_id: Option<&str>,
    ) -> Result<Vec<QueuedMessage>, McpError> {
        let mut queues = self.lock_write()?;
        Ok(queues
            .remove(task_id)
            .map(Vec::from)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_core::protocol::RequestId;

    fn store() -> InMemoryTaskStore {
        InMemoryTaskStore::new()
    }

    async fn create(store: &InMemoryTaskStore, session: Option<&str>) -> Task {
        store
            .create_task(
                TaskMetadata::default(),
                RequestId::Number(1),
                serde_json::json!({"method": "tools/call"}),
                session,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = store();
        let task = create(&store, None).await;
        assert_eq!(task.status, TaskStatus::Working);

        let fetched = store.get_task(&task.task_id, None).await.unwrap().unwrap();
        assert_eq!(fetched.task_id, task.task_id);
    }

    #[tokio::test]
    async fn terminal_tasks_reject_updates() {
        let store = store();
        let task = create(&store, None).await;

        store
            .store_task_result(
                &task.task_id,
                TaskStatus::Completed,
                serde_json::json!({"ok": true}),
                None,
            )
            .await
            .unwrap();

        let err = store
            .update_task_status(&task.task_id, TaskStatus::Working, None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already completed"));

        let err = store
            .store_task_result(&task.task_id, TaskStatus::Failed, Value::Null, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already completed"));
    }

    #[tokio::test]
    async fn store_result_requires_terminal_status() {
        let store = store();
        let task = create(&store, None).await;
        let err = store
            .store_task_result(&task.task_id, TaskStatus::Working, Value::Null, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("terminal"));
    }

    #[tokio::test]
    async fn result_round_trip() {
        let store = store();
        let task = create(&store, None).await;

        assert!(store.get_task_result(&task.task_id, None).await.is_err());

        store
            .store_task_result(
                &task.task_id,
                TaskStatus::Completed,
                serde_json::json!({"answer": 42}),
                None,
            )
            .await
            .unwrap();

        let result = store.get_task_result(&task.task_id, None).await.unwrap();
        assert_eq!(result["answer"], 42);
    }

    #[tokio::test]
    async fn session_isolation() {
        let store = store();
        let task = create(&store, Some("session-a")).await;

        assert!(store
            .get_task(&task.task_id, Some("session-a"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_task(&task.task_id, Some("session-b"))
            .await
            .unwrap()
            .is_none());
        assert!(store.get_task(&task.task_id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn distinct_stores_are_isolated() {
        let a = store();
        let b = store();
        let task = create(&a, None).await;
        assert!(b.get_task(&task.task_id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_only_non_terminal() {
        let store = store();
        let task = create(&store, None).await;

        assert!(store.cancel_task(&task.task_id, None).await.unwrap());
        // Second cancel is a no-op.
        assert!(!store.cancel_task(&task.task_id, None).await.unwrap());
        assert!(!store.cancel_task("no-such-task", None).await.unwrap());
    }

    #[tokio::test]
    async fn list_pagination_and_bad_cursor() {
        let store = InMemoryTaskStore::new().page_size(2);
        for _ in 0..5 {
            create(&store, None).await;
        }

        let page1 = store.list_tasks(None, None).await.unwrap();
        assert_eq!(page1.tasks.len(), 2);
        let cursor = page1.next_cursor.unwrap();

        let page2 = store.list_tasks(Some(&cursor), None).await.unwrap();
        assert_eq!(page2.tasks.len(), 2);

        let page3 = store
            .list_tasks(page2.next_cursor.as_deref(), None)
            .await
            .unwrap();
        assert_eq!(page3.tasks.len(), 1);
        assert!(page3.next_cursor.is_none());

        let err = store.list_tasks(Some("not-a-cursor"), None).await.unwrap_err();
        assert!(err.to_string().contains("invalid cursor"));
    }

    #[tokio::test]
    async fn ttl_eviction() {
        let store = store();
        let task = store
            .create_task(
                TaskMetadata::with_ttl(0),
                RequestId::Number(1),
                Value::Null,
                None,
            )
            .await
            .unwrap();
        // ttl of zero expires immediately on next access
        assert!(store.get_task(&task.task_id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn queue_fifo_and_cap() {
        let queue = InMemoryTaskMessageQueue::new();
        for i in 0..3 {
            queue
                .enqueue(
                    "t1",
                    QueuedMessage::request(serde_json::json!({ "id": i })),
                    None,
                    Some(3),
                )
                .await
                .unwrap();
        }

        let err = queue
            .enqueue(
                "t1",
                QueuedMessage::request(serde_json::json!({ "id": 3 })),
                None,
                Some(3),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("full"));

        let first = queue.dequeue("t1", None).await.unwrap().unwrap();
        assert_eq!(first.message["id"], 0);

        let rest = queue.dequeue_all("t1", None).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].message["id"], 1);

        // Drained: nothing left.
        assert!(queue.dequeue("t1", None).await.unwrap().is_none());
        assert!(queue.dequeue_all("t1", None).await.unwrap().is_empty());
    }
}
