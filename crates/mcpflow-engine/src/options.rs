//! Engine and per-request configuration.

use crate::tasks::{TaskMessageQueue, TaskStore};
use mcpflow_core::capability::Capabilities;
use mcpflow_core::types::Progress;
use std::sync::Arc;
use std::time::Duration;

/// The default timeout applied to outgoing requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The default task polling interval when the server supplies no hint.
pub const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Callback invoked for each progress notification matching a request.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Options governing a protocol instance.
///
/// # Example
///
/// ```rust
/// use mcpflow_engine::ProtocolOptions;
/// use mcpflow_core::capability::Capabilities;
///
/// let options = ProtocolOptions::new()
///     .strict()
///     .capabilities(Capabilities::new().with_tools())
///     .debounce_notification("notifications/tools/list_changed");
/// ```
#[derive(Clone)]
pub struct ProtocolOptions {
    /// Whether to enforce capability checks on outgoing requests.
    pub enforce_strict_capabilities: bool,
    /// Notification methods coalesced per dispatcher yield when sent with
    /// empty params.
    pub debounced_notification_methods: Vec<String>,
    /// Default timeout for outgoing requests.
    pub default_request_timeout: Duration,
    /// Default polling interval for task streams.
    pub default_task_poll_interval: Duration,
    /// Capabilities this side declares during the handshake. Handler
    /// registration is gated against this record.
    pub capabilities: Capabilities,
    /// Per-task cap on side-channel queue length.
    pub max_task_queue_size: Option<usize>,
    pub(crate) task_store: Option<Arc<dyn TaskStore>>,
    pub(crate) task_queue: Option<Arc<dyn TaskMessageQueue>>,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            enforce_strict_capabilities: false,
            debounced_notification_methods: Vec::new(),
            default_request_timeout: DEFAULT_REQUEST_TIMEOUT,
            default_task_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            capabilities: Capabilities::default(),
            max_task_queue_size: None,
            task_store: None,
            task_queue: None,
        }
    }
}

impl ProtocolOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce capability checks on outgoing requests.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.enforce_strict_capabilities = true;
        self
    }

    /// Declare local capabilities.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Add a notification method to the debounced set.
    #[must_use]
    pub fn debounce_notification(mut self, method: impl Into<String>) -> Self {
        self.debounced_notification_methods.push(method.into());
        self
    }

    /// Set the default timeout for outgoing requests.
    #[must_use]
    pub fn default_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout = timeout;
        self
    }

    /// Set the default polling interval for task streams.
    #[must_use]
    pub fn default_task_poll_interval(mut self, interval: Duration) -> Self {
        self.default_task_poll_interval = interval;
        self
    }

    /// Attach a task store. The built-in `tasks/*` handlers are registered
    /// iff a store is configured.
    #[must_use]
    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    /// Attach a side-channel message queue for tasks.
    #[must_use]
    pub fn task_queue(mut self, queue: Arc<dyn TaskMessageQueue>) -> Self {
        self.task_queue = Some(queue);
        self
    }

    /// Cap the side-channel queue length per task.
    #[must_use]
    pub fn max_task_queue_size(mut self, max: usize) -> Self {
        self.max_task_queue_size = Some(max);
        self
    }
}

impl std::fmt::Debug for ProtocolOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolOptions")
            .field(
                "enforce_strict_capabilities",
                &self.enforce_strict_capabilities,
            )
            .field(
                "debounced_notification_methods",
                &self.debounced_notification_methods,
            )
            .field("default_request_timeout", &self.default_request_timeout)
            .field(
                "default_task_poll_interval",
                &self.default_task_poll_interval,
            )
            .field("max_task_queue_size", &self.max_task_queue_size)
            .field("task_store", &self.task_store.is_some())
            .field("task_queue", &self.task_queue.is_some())
            .finish_non_exhaustive()
    }
}

/// Options for an individual outgoing request.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Timeout override; falls back to the protocol default.
    pub timeout: Option<Duration>,
    /// Re-arm the timeout whenever a progress notification arrives.
    pub reset_timeout_on_progress: bool,
    /// Upper bound on total elapsed time, regardless of progress.
    pub max_total_timeout: Option<Duration>,
    /// Progress callback; its presence opts the request into progress
    /// tokens.
    pub on_progress: Option<ProgressCallback>,
    /// Abort signal for caller-initiated cancellation.
    pub signal: Option<crate::context::CancellationToken>,
    /// Task augmentation: ask the peer to run this request as a task.
    pub task: Option<mcpflow_core::types::TaskMetadata>,
    /// Route this request through the named task's side-channel queue.
    pub related_task: Option<String>,
}

impl RequestOptions {
    /// Create request options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Re-arm the timeout on progress.
    #[must_use]
    pub fn reset_timeout_on_progress(mut self) -> Self {
        self.reset_timeout_on_progress = true;
        self
    }

    /// Bound total elapsed time across timeout re-arms.
    #[must_use]
    pub fn max_total_timeout(mut self, max: Duration) -> Self {
        self.max_total_timeout = Some(max);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Set the abort signal.
    #[must_use]
    pub fn signal(mut self, signal: crate::context::CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Request task augmentation.
    #[must_use]
    pub fn task(mut self, task: mcpflow_core::types::TaskMetadata) -> Self {
        self.task = Some(task);
        self
    }

    /// Route through a task's side channel.
    #[must_use]
    pub fn related_task(mut self, task_id: impl Into<String>) -> Self {
        self.related_task = Some(task_id.into());
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("timeout", &self.timeout)
            .field("reset_timeout_on_progress", &self.reset_timeout_on_progress)
            .field("max_total_timeout", &self.max_total_timeout)
            .field("on_progress", &self.on_progress.is_some())
            .field("signal", &self.signal.is_some())
            .field("task", &self.task)
            .field("related_task", &self.related_task)
            .finish()
    }
}
