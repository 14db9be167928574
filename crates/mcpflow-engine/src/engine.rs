//! The bidirectional protocol engine.
//!
//! [`Protocol`] owns one transport and implements message correlation,
//! timeouts, cancellation, progress routing, notification debouncing,
//! capability gating, and the task side channel. The same engine backs both
//! client and server roles; the handshake helpers in `handshake.rs` are the
//! only role-specific surface.
//!
//! # Concurrency model
//!
//! One dispatch task per connected protocol reads the transport and
//! processes messages in arrival order. Responses resolve pending
//! completers inline; request and notification handlers run in spawned
//! tasks so a suspended handler never blocks dispatch. All engine state
//! sits behind short-lived mutexes that are never held across an await.

use crate::context::{CancellationToken, RequestContext};
use crate::options::{ProgressCallback, ProtocolOptions, RequestOptions};
use crate::tasks::{register_builtin_task_handlers, TaskContext, TaskMessageQueue, TaskStore};
use futures::future::BoxFuture;
use mcpflow_core::capability::{Capabilities, Implementation};
use mcpflow_core::error::{JsonRpcError, McpError};
use mcpflow_core::methods::notifications;
use mcpflow_core::protocol::{
    ErrorResponse, Message, Notification, Request, RequestId, Response,
};
use mcpflow_core::types::{
    CancelledParams, Progress, ProgressParams, QueuedMessage, QueuedMessageKind, Task,
};
use mcpflow_transport::Transport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Type-erased request handler stored in the dispatch table.
pub type RequestHandlerFn<T> = Arc<
    dyn Fn(Request, RequestContext<T>) -> BoxFuture<'static, Result<Value, McpError>>
        + Send
        + Sync,
>;

/// Type-erased notification handler stored in the dispatch table.
pub type NotificationHandlerFn =
    Arc<dyn Fn(Notification) -> BoxFuture<'static, Result<(), McpError>> + Send + Sync>;

type CloseHook = Arc<dyn Fn() + Send + Sync>;
type ErrorHook = Arc<dyn Fn(McpError) + Send + Sync>;

/// Which path a pending request's response arrives on.
///
/// A reply arriving on either path resolves the same pending entry; the
/// variant matters for cleanup, which must route synthetic messages back
/// through the owning task's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResponsePath {
    /// The primary transport.
    Wire,
    /// A task's side-channel queue; the entry was parked at enqueue time.
    Queued {
        /// The task whose queue carries this request.
        task_id: String,
    },
}

struct TimeoutState {
    handle: JoinHandle<()>,
    started: Instant,
    timeout: Duration,
    max_total: Option<Duration>,
    reset_on_progress: bool,
}

struct PendingRequest {
    responder: oneshot::Sender<Result<Value, McpError>>,
    path: ResponsePath,
    timeout: TimeoutState,
}

struct ProgressEntry {
    callback: ProgressCallback,
    retain_after_response: bool,
}

struct Shared<T: Transport + 'static> {
    options: ProtocolOptions,
    next_id: AtomicI64,
    closed: AtomicBool,
    transport: Mutex<Option<Arc<T>>>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<HashMap<i64, PendingRequest>>,
    progress: Mutex<HashMap<i64, ProgressEntry>>,
    incoming: Mutex<HashMap<RequestId, CancellationToken>>,
    request_handlers: Mutex<HashMap<String, RequestHandlerFn<T>>>,
    notification_handlers: Mutex<HashMap<String, NotificationHandlerFn>>,
    fallback_request_handler: Mutex<Option<RequestHandlerFn<T>>>,
    fallback_notification_handler: Mutex<Option<NotificationHandlerFn>>,
    debounce_pending: Mutex<HashSet<String>>,
    peer_capabilities: Mutex<Option<Capabilities>>,
    peer_info: Mutex<Option<Implementation>>,
    on_close: Mutex<Option<CloseHook>>,
    on_error: Mutex<Option<ErrorHook>>,
}

/// A bidirectional JSON-RPC engine with MCP task semantics.
///
/// Cheap to clone; clones share the same connection and state.
///
/// # Example
///
/// ```no_run
/// use mcpflow_engine::{Protocol, ProtocolOptions, RequestOptions};
/// use mcpflow_transport::MemoryTransport;
/// use mcpflow_core::types::EmptyResult;
///
/// # async fn example() -> Result<(), mcpflow_core::error::McpError> {
/// let (client_side, _server_side) = MemoryTransport::pair();
/// let protocol = Protocol::new(ProtocolOptions::new());
/// protocol.connect(client_side).await?;
/// let _: EmptyResult = protocol
///     .request("ping", None, RequestOptions::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Protocol<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport + 'static> Clone for Protocol<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport + 'static> Protocol<T> {
    /// Create a new, unconnected protocol.
    #[must_use]
    pub fn new(options: ProtocolOptions) -> Self {
        let protocol = Self {
            shared: Arc::new(Shared {
                options,
                next_id: AtomicI64::new(1),
                closed: AtomicBool::new(false),
                transport: Mutex::new(None),
                dispatch_handle: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                progress: Mutex::new(HashMap::new()),
                incoming: Mutex::new(HashMap::new()),
                request_handlers: Mutex::new(HashMap::new()),
                notification_handlers: Mutex::new(HashMap::new()),
                fallback_request_handler: Mutex::new(None),
                fallback_notification_handler: Mutex::new(None),
                debounce_pending: Mutex::new(HashSet::new()),
                peer_capabilities: Mutex::new(None),
                peer_info: Mutex::new(None),
                on_close: Mutex::new(None),
                on_error: Mutex::new(None),
            }),
        };
        protocol.register_builtins();
        protocol
    }

    fn register_builtins(&self) {
        // ping answers with the empty result, no capability involved
        let ping: RequestHandlerFn<T> = Arc::new(|_req, _ctx| {
            Box::pin(async { Ok(Value::Object(serde_json::Map::new())) })
        });
        let registered = self.set_request_handler_raw("ping", ping);
        if let Err(err) = registered {
            warn!(%err, "failed to register ping handler");
        }
        if self.shared.options.task_store.is_some() {
            if let Err(err) = register_builtin_task_handlers(self) {
                warn!(%err, "failed to register task handlers");
            }
        }
    }

    /// The options this protocol was built with.
    #[must_use]
    pub fn options(&self) -> &ProtocolOptions {
        &self.shared.options
    }

    /// The peer's capabilities, once the handshake has run.
    #[must_use]
    pub fn peer_capabilities(&self) -> Option<Capabilities> {
        self.shared
            .peer_capabilities
            .lock()
            .ok()
            .and_then(|caps| caps.clone())
    }

    /// The peer's identity, once the handshake has run.
    #[must_use]
    pub fn peer_info(&self) -> Option<Implementation> {
        self.shared.peer_info.lock().ok().and_then(|info| info.clone())
    }

    pub(crate) fn set_peer(&self, capabilities: Capabilities, info: Implementation) {
        if let Ok(mut caps) = self.shared.peer_capabilities.lock() {
            *caps = Some(capabilities);
        }
        if let Ok(mut slot) = self.shared.peer_info.lock() {
            *slot = Some(info);
        }
    }

    /// The transport's session identity, if connected.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.transport().and_then(|t| t.session_id())
    }

    /// Whether a transport is attached and not yet closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst) && self.transport().is_some()
    }

    /// Install the close hook, invoked exactly once at teardown.
    pub fn on_close(&self, hook: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.shared.on_close.lock() {
            *slot = Some(Arc::new(hook));
        }
    }

    /// Install the error hook.
    ///
    /// Dispatch-internal faults (bad envelopes, non-integer ids or progress
    /// tokens, unmatched responses, failed reply sends) are reported here and
    /// never propagate up the dispatch loop.
    pub fn on_error(&self, hook: impl Fn(McpError) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.shared.on_error.lock() {
            *slot = Some(Arc::new(hook));
        }
    }

    pub(crate) fn emit_error(&self, error: McpError) {
        Self::emit_error_shared(&self.shared, error);
    }

    fn emit_error_shared(shared: &Arc<Shared<T>>, error: McpError) {
        let hook = shared.on_error.lock().ok().and_then(|h| h.clone());
        if let Some(hook) = hook {
            hook(error);
        } else {
            tracing::error!(%error, "protocol error (no error hook installed)");
        }
    }

    fn transport(&self) -> Option<Arc<T>> {
        self.shared.transport.lock().ok().and_then(|t| t.clone())
    }

    // ==========================================================================
    // Connection lifecycle
    // ==========================================================================

    /// Attach a transport and start dispatching.
    ///
    /// Fails if this protocol is already connected or has been closed.
    pub async fn connect(&self, transport: T) -> Result<(), McpError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(McpError::internal("protocol has been closed"));
        }
        let transport = Arc::new(transport);
        {
            let mut guard = self
                .shared
                .transport
                .lock()
                .map_err(|_| McpError::internal("transport lock poisoned"))?;
            if guard.is_some() {
                return Err(McpError::internal("protocol is already connected"));
            }
            *guard = Some(Arc::clone(&transport));
        }

        if let Err(err) = transport.start().await {
            if let Ok(mut guard) = self.shared.transport.lock() {
                *guard = None;
            }
            return Err(McpError::internal(format!(
                "failed to start transport: {err}"
            )));
        }

        let handle = Self::spawn_dispatch(Arc::clone(&self.shared), transport);
        if let Ok(mut slot) = self.shared.dispatch_handle.lock() {
            *slot = Some(handle);
        }
        debug!("protocol connected");
        Ok(())
    }

    /// Close the connection.
    ///
    /// Completes every pending request with [`McpError::ConnectionClosed`],
    /// aborts every in-flight incoming handler, cancels every timer, and
    /// invokes the close hook. Idempotent.
    pub async fn close(&self) -> Result<(), McpError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Ok(mut slot) = self.shared.dispatch_handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        let transport = self
            .shared
            .transport
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(transport) = transport {
            if let Err(err) = transport.close().await {
                Self::emit_error_shared(
                    &self.shared,
                    McpError::internal(format!("transport close failed: {err}")),
                );
            }
        }
        Self::teardown(&self.shared);
        Ok(())
    }

    fn teardown(shared: &Arc<Shared<T>>) {
        let drained: Vec<PendingRequest> = shared
            .pending
            .lock()
            .map(|mut pending| pending.drain().map(|(_, entry)| entry).collect())
            .unwrap_or_default();
        for entry in drained {
            entry.timeout.handle.abort();
            let _ = entry.responder.send(Err(McpError::ConnectionClosed));
        }
        if let Ok(mut progress) = shared.progress.lock() {
            progress.clear();
        }
        let tokens: Vec<CancellationToken> = shared
            .incoming
            .lock()
            .map(|mut incoming| incoming.drain().map(|(_, token)| token).collect())
            .unwrap_or_default();
        for token in tokens {
            token.cancel_with_reason("connection closed");
        }
        if let Ok(mut debounce) = shared.debounce_pending.lock() {
            debounce.clear();
        }
        let hook = shared.on_close.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook();
        }
        debug!("protocol closed");
    }

    fn spawn_dispatch(shared: Arc<Shared<T>>, transport: Arc<T>) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("dispatch loop started");
            loop {
                match transport.recv().await {
                    Ok(Some(message)) => Self::dispatch(&shared, message).await,
                    Ok(None) => {
                        debug!("transport closed by peer");
                        if !shared.closed.swap(true, Ordering::SeqCst) {
                            if let Ok(mut guard) = shared.transport.lock() {
                                guard.take();
                            }
                            Self::teardown(&shared);
                        }
                        break;
                    }
                    Err(err) => {
                        Self::emit_error_shared(
                            &shared,
                            McpError::internal(format!("transport receive failed: {err}")),
                        );
                        if !shared.closed.swap(true, Ordering::SeqCst) {
                            if let Ok(mut guard) = shared.transport.lock() {
                                guard.take();
                            }
                            Self::teardown(&shared);
                        }
                        break;
                    }
                }
            }
            debug!("dispatch loop stopped");
        })
    }

    // ==========================================================================
    // Outgoing requests
    // ==========================================================================

    /// Send a request and deserialize the result.
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<R, McpError> {
        let value = self.request_value(method, params, options).await?;
        serde_json::from_value(value).map_err(McpError::from)
    }

    /// Send a request and return the raw result value.
    pub async fn request_value(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, McpError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed);
        }

        let peer_caps = self.peer_capabilities();
        if shared.options.enforce_strict_capabilities {
            if let Some(peer) = &peer_caps {
                peer.ensure_peer_capability(method)?;
            }
        }
        if options.task.is_some() {
            if let Some(peer) = &peer_caps {
                if let Err(err) = peer.ensure_task_augmentation(method) {
                    if shared.options.enforce_strict_capabilities {
                        return Err(err);
                    }
                    debug!(method, %err, "peer did not declare task support; proceeding");
                }
            }
        }

        if let Some(signal) = &options.signal {
            if signal.is_cancelled() {
                return Err(signal.abort_error());
            }
        }

        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        let mut request = match params {
            Some(params) => Request::with_params(method.to_string(), id, params),
            None => Request::new(method.to_string(), id),
        };

        if options.on_progress.is_some() {
            request.set_progress_token(id);
        }
        if let Some(task) = &options.task {
            request.set_task_params(serde_json::to_value(task)?);
        }
        if let Some(task_id) = &options.related_task {
            request.set_related_task(task_id);
        }
        if let Some(callback) = &options.on_progress {
            if let Ok(mut progress) = shared.progress.lock() {
                progress.insert(
                    id,
                    ProgressEntry {
                        callback: Arc::clone(callback),
                        retain_after_response: false,
                    },
                );
            }
        }

        let timeout = options.timeout.unwrap_or(shared.options.default_request_timeout);
        let (tx, rx) = oneshot::channel();
        let path = match &options.related_task {
            Some(task_id) => ResponsePath::Queued {
                task_id: task_id.clone(),
            },
            None => ResponsePath::Wire,
        };
        trace!(method, id, ?path, "sending request");
        {
            let handle = Self::spawn_timeout_task(shared, id, timeout, timeout);
            let entry = PendingRequest {
                responder: tx,
                path,
                timeout: TimeoutState {
                    handle,
                    started: Instant::now(),
                    timeout,
                    max_total: options.max_total_timeout,
                    reset_on_progress: options.reset_timeout_on_progress,
                },
            };
            shared
                .pending
                .lock()
                .map_err(|_| McpError::internal("pending lock poisoned"))?
                .insert(id, entry);
        }

        let sent = if let Some(task_id) = &options.related_task {
            // side channel: park the completer, enqueue the body, skip the wire
            let body = serde_json::to_value(&request)?;
            self.enqueue_task_message(
                task_id,
                QueuedMessage::request(body),
                self.session_id().as_deref(),
            )
            .await
        } else {
            match self.transport() {
                Some(transport) => transport
                    .send(Message::Request(request), None)
                    .await
                    .map_err(|err| {
                        McpError::internal(format!("transport send failed: {err}"))
                    }),
                None => Err(McpError::ConnectionClosed),
            }
        };
        if let Err(err) = sent {
            self.remove_request_state(id);
            return Err(err);
        }

        // The watcher lives until either the signal fires or this future
        // resolves and drops the guard.
        let _done_guard = options.signal.clone().map(|signal| {
            let (done_tx, done_rx) = oneshot::channel::<()>();
            let protocol = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = signal.cancelled() => {
                        protocol.abort_pending_request(id, &signal).await;
                    }
                    _ = done_rx => {}
                }
            });
            done_tx
        });

        rx.await.map_err(|_| McpError::ConnectionClosed)?
    }

    /// Remove all local state for an outgoing request; returns its entry.
    fn take_pending(&self, id: i64) -> Option<PendingRequest> {
        let entry = self
            .shared
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&id));
        if let Some(entry) = &entry {
            entry.timeout.handle.abort();
        }
        if let Ok(mut progress) = self.shared.progress.lock() {
            progress.remove(&id);
        }
        entry
    }

    fn remove_request_state(&self, id: i64) {
        let _ = self.take_pending(id);
    }

    async fn abort_pending_request(&self, id: i64, signal: &CancellationToken) {
        let Some(entry) = self.take_pending(id) else {
            return; // already completed
        };
        let mut params = serde_json::json!({ "requestId": id });
        if let Some(reason) = signal.reason() {
            params["reason"] = Value::from(reason);
        }
        // route the cancellation the same way the request travelled
        let sent = match &entry.path {
            ResponsePath::Wire => self.notify(notifications::CANCELLED, Some(params)).await,
            ResponsePath::Queued { task_id } => {
                let notification = Notification::with_params(
                    notifications::CANCELLED.to_string(),
                    params,
                );
                match serde_json::to_value(&notification) {
                    Ok(body) => {
                        self.enqueue_task_message(
                            task_id,
                            QueuedMessage::notification(body),
                            self.session_id().as_deref(),
                        )
                        .await
                    }
                    Err(err) => Err(err.into()),
                }
            }
        };
        if let Err(err) = sent {
            self.emit_error(err);
        }
        let _ = entry.responder.send(Err(signal.abort_error()));
    }

    fn spawn_timeout_task(
        shared: &Arc<Shared<T>>,
        id: i64,
        delay: Duration,
        timeout_for_error: Duration,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(shared);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else { return };
            let entry = shared
                .pending
                .lock()
                .ok()
                .and_then(|mut pending| pending.remove(&id));
            let Some(entry) = entry else { return };
            if let Ok(mut progress) = shared.progress.lock() {
                progress.remove(&id);
            }
            debug!(id, ?timeout_for_error, "request timed out");
            let _ = entry.responder.send(Err(McpError::RequestTimeout {
                timeout: timeout_for_error,
            }));
        })
    }

    // ==========================================================================
    // Outgoing notifications
    // ==========================================================================

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.notify_related(method, params, None).await
    }

    /// Send a notification with a related-request hint for the transport.
    ///
    /// Parameterless notifications listed in
    /// `debounced_notification_methods` and carrying no related request are
    /// coalesced: the first emission per dispatcher yield is sent, the rest
    /// are dropped.
    pub async fn notify_related(
        &self,
        method: &str,
        params: Option<Value>,
        related_request_id: Option<&RequestId>,
    ) -> Result<(), McpError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed);
        }
        let notification = match params {
            Some(params) => Notification::with_params(method.to_string(), params),
            None => Notification::new(method.to_string()),
        };

        let debounce = related_request_id.is_none()
            && notification.params_is_empty()
            && shared
                .options
                .debounced_notification_methods
                .iter()
                .any(|m| m == method);
        if debounce {
            {
                let mut pending = shared
                    .debounce_pending
                    .lock()
                    .map_err(|_| McpError::internal("debounce lock poisoned"))?;
                if !pending.insert(method.to_string()) {
                    trace!(method, "debounced duplicate notification");
                    return Ok(());
                }
            }
            let protocol = self.clone();
            let method = method.to_string();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                if let Ok(mut pending) = protocol.shared.debounce_pending.lock() {
                    pending.remove(&method);
                }
                if let Some(transport) = protocol.transport() {
                    let flush = Message::Notification(Notification::new(method));
                    if let Err(err) = transport.send(flush, None).await {
                        protocol.emit_error(McpError::internal(format!(
                            "transport send failed: {err}"
                        )));
                    }
                }
            });
            return Ok(());
        }

        match self.transport() {
            Some(transport) => transport
                .send(Message::Notification(notification), related_request_id)
                .await
                .map_err(|err| McpError::internal(format!("transport send failed: {err}"))),
            None => Err(McpError::ConnectionClosed),
        }
    }

    // ==========================================================================
    // Handler registration
    // ==========================================================================

    /// Register a typed request handler.
    ///
    /// Registration asserts the local capability for the method and rejects
    /// duplicates until [`Protocol::remove_request_handler`] is called.
    pub fn set_request_handler<P, R, F, Fut>(
        &self,
        method: impl Into<String>,
        handler: F,
    ) -> Result<(), McpError>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, RequestContext<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<R, McpError>> + Send + 'static,
    {
        let method = method.into();
        self.shared
            .options
            .capabilities
            .ensure_local_capability(&method)?;
        let handler = Arc::new(handler);
        let dispatcher: RequestHandlerFn<T> = Arc::new(move |req: Request, ctx| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let raw = req
                    .params
                    .clone()
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                let params: P = serde_json::from_value(raw).map_err(|err| {
                    McpError::invalid_params(format!(
                        "invalid params for {}: {err}",
                        req.method
                    ))
                })?;
                let result = handler(params, ctx).await?;
                serde_json::to_value(result).map_err(McpError::from)
            })
        });
        self.set_request_handler_raw(method, dispatcher)
    }

    pub(crate) fn set_request_handler_raw(
        &self,
        method: impl Into<String>,
        handler: RequestHandlerFn<T>,
    ) -> Result<(), McpError> {
        let method = method.into();
        let mut handlers = self
            .shared
            .request_handlers
            .lock()
            .map_err(|_| McpError::internal("handler lock poisoned"))?;
        if handlers.contains_key(&method) {
            return Err(McpError::internal(format!(
                "a request handler for {method} is already registered; remove it first"
            )));
        }
        handlers.insert(method, handler);
        Ok(())
    }

    /// Remove a request handler, making the method re-registrable.
    pub fn remove_request_handler(&self, method: &str) {
        if let Ok(mut handlers) = self.shared.request_handlers.lock() {
            handlers.remove(method);
        }
    }

    /// Register the fallback handler for requests with no dedicated handler.
    pub fn set_fallback_request_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Request, RequestContext<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, McpError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let dispatcher: RequestHandlerFn<T> = Arc::new(move |req, ctx| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(req, ctx).await })
        });
        if let Ok(mut slot) = self.shared.fallback_request_handler.lock() {
            *slot = Some(dispatcher);
        }
    }

    /// Register a typed notification handler.
    ///
    /// Handler errors are routed to the error hook, not to the peer.
    pub fn set_notification_handler<P, F, Fut>(
        &self,
        method: impl Into<String>,
        handler: F,
    ) -> Result<(), McpError>
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), McpError>> + Send + 'static,
    {
        let method = method.into();
        self.shared
            .options
            .capabilities
            .ensure_local_capability(&method)?;
        let handler = Arc::new(handler);
        let dispatcher: NotificationHandlerFn = Arc::new(move |n: Notification| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let raw = n
                    .params
                    .clone()
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                let params: P = serde_json::from_value(raw).map_err(|err| {
                    McpError::invalid_params(format!("invalid params for {}: {err}", n.method))
                })?;
                handler(params).await
            })
        });
        let mut handlers = self
            .shared
            .notification_handlers
            .lock()
            .map_err(|_| McpError::internal("handler lock poisoned"))?;
        if handlers.contains_key(&method) {
            return Err(McpError::internal(format!(
                "a notification handler for {method} is already registered; remove it first"
            )));
        }
        handlers.insert(method, dispatcher);
        Ok(())
    }

    /// Remove a notification handler.
    pub fn remove_notification_handler(&self, method: &str) {
        if let Ok(mut handlers) = self.shared.notification_handlers.lock() {
            handlers.remove(method);
        }
    }

    /// Register the fallback handler for unrecognized notifications.
    pub fn set_fallback_notification_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Notification) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), McpError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let dispatcher: NotificationHandlerFn = Arc::new(move |n| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(n).await })
        });
        if let Ok(mut slot) = self.shared.fallback_notification_handler.lock() {
            *slot = Some(dispatcher);
        }
    }

    // ==========================================================================
    // Task plumbing
    // ==========================================================================

    pub(crate) fn task_store(&self) -> Option<Arc<dyn TaskStore>> {
        self.shared.options.task_store.clone()
    }

    pub(crate) fn task_queue(&self) -> Option<Arc<dyn TaskMessageQueue>> {
        self.shared.options.task_queue.clone()
    }

    pub(crate) fn task_context(&self, ctx: &RequestContext<T>) -> Option<TaskContext<T>> {
        let store = self.task_store()?;
        Some(TaskContext::for_request(self.clone(), store, ctx))
    }

    /// Push a message onto a task's side-channel queue.
    pub(crate) async fn enqueue_task_message(
        &self,
        task_id: &str,
        message: QueuedMessage,
        session_id: Option<&str>,
    ) -> Result<(), McpError> {
        let Some(queue) = self.task_queue() else {
            return Err(McpError::internal(
                "no task message queue configured for side-channel messages",
            ));
        };
        queue
            .enqueue(
                task_id,
                message,
                session_id,
                self.shared.options.max_task_queue_size,
            )
            .await
    }

    /// Emit `notifications/tasks/status` for a task; failures go to the
    /// error hook.
    pub(crate) async fn send_task_status(&self, task: &Task) {
        match serde_json::to_value(task) {
            Ok(params) => {
                if let Err(err) = self.notify(notifications::TASKS_STATUS, Some(params)).await {
                    self.emit_error(err);
                }
            }
            Err(err) => self.emit_error(err.into()),
        }
    }

    /// Resolve a parked side-channel request with a synthetic error.
    ///
    /// Used by `tasks/cancel` when draining a queue: each dequeued
    /// request-type message still has a completer waiting for its reply.
    pub(crate) fn resolve_parked_request(&self, id: i64, error: McpError) {
        if let Some(entry) = self.take_pending(id) {
            let _ = entry.responder.send(Err(error));
        }
    }

    // ==========================================================================
    // Incoming dispatch
    // ==========================================================================

    async fn dispatch(shared: &Arc<Shared<T>>, message: Message) {
        match message {
            Message::Response(response) => {
                Self::complete_request(shared, &response.id, Ok(response.result));
            }
            Message::Error(error) => {
                Self::complete_request(shared, &error.id, Err(error.error.into()));
            }
            Message::Request(request) => {
                Self::dispatch_request(shared, request);
            }
            Message::Notification(notification) => {
                Self::dispatch_notification(shared, notification).await;
            }
        }
    }

    /// Resolve the pending completer for a reply arriving on either path.
    fn complete_request(
        shared: &Arc<Shared<T>>,
        id: &RequestId,
        outcome: Result<Value, McpError>,
    ) {
        let Some(id) = id.as_number() else {
            Self::emit_error_shared(
                shared,
                McpError::format(format!("response id must be an integer, got {id}")),
            );
            return;
        };
        let entry = shared
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&id));
        let Some(entry) = entry else {
            Self::emit_error_shared(
                shared,
                McpError::internal(format!("received response for unknown request id {id}")),
            );
            return;
        };
        entry.timeout.handle.abort();

        // A task-returning response keeps its progress entry alive so
        // post-response task notifications can still resolve.
        let retain = outcome
            .as_ref()
            .ok()
            .and_then(|value| value.get("task"))
            .and_then(|task| task.get("taskId"))
            .is_some();
        if let Ok(mut progress) = shared.progress.lock() {
            if retain {
                if let Some(entry) = progress.get_mut(&id) {
                    entry.retain_after_response = true;
                }
            } else {
                progress.remove(&id);
            }
        }

        trace!(id, retain, "completing request");
        let _ = entry.responder.send(outcome);
    }

    fn dispatch_request(shared: &Arc<Shared<T>>, request: Request) {
        let protocol = Protocol {
            shared: Arc::clone(shared),
        };
        let method = request.method().to_string();
        let related_task = request.related_task().map(String::from);
        let session_id = protocol.session_id();

        let handler = shared
            .request_handlers
            .lock()
            .ok()
            .and_then(|handlers| handlers.get(&method).cloned())
            .or_else(|| {
                shared
                    .fallback_request_handler
                    .lock()
                    .ok()
                    .and_then(|fallback| fallback.clone())
            });
        let Some(handler) = handler else {
            warn!(method, "no handler for request");
            let reply = ErrorResponse::new(
                request.id.clone(),
                JsonRpcError::method_not_found(format!("no handler for method: {method}")),
            );
            let protocol = protocol.clone();
            tokio::spawn(async move {
                protocol
                    .route_reply(Message::Error(reply), related_task.as_deref(), &request.id)
                    .await;
            });
            return;
        };

        // task-augmented requests need the handler side to have declared them
        if request.task_params().is_some() || request.meta_task_id().is_some() {
            if let Err(err) = shared
                .options
                .capabilities
                .ensure_task_augmentation(&method)
            {
                let reply = ErrorResponse::new(request.id.clone(), JsonRpcError::from(&err));
                tokio::spawn(async move {
                    protocol
                        .route_reply(Message::Error(reply), related_task.as_deref(), &request.id)
                        .await;
                });
                return;
            }
        }

        let token = CancellationToken::new();
        if let Ok(mut incoming) = shared.incoming.lock() {
            incoming.insert(request.id.clone(), token.clone());
        }

        let raw_request = serde_json::to_value(&request).unwrap_or(Value::Null);
        let ctx = RequestContext {
            protocol: protocol.clone(),
            request_id: request.id.clone(),
            session_id,
            meta: request.meta().cloned(),
            task_id: request.meta_task_id().map(String::from),
            related_task: related_task.clone(),
            signal: token.clone(),
            progress_token: request
                .meta()
                .and_then(|meta| meta.get("progressToken"))
                .and_then(Value::as_i64),
            raw_request,
        };

        let request_id = request.id.clone();
        tokio::spawn(async move {
            let outcome = handler(request, ctx).await;
            if token.is_cancelled() {
                debug!(%request_id, "dropping reply for cancelled request");
            } else {
                let reply = match outcome {
                    Ok(result) => Message::Response(Response::new(request_id.clone(), result)),
                    Err(err) => Message::Error(ErrorResponse::new(
                        request_id.clone(),
                        JsonRpcError::from(&err),
                    )),
                };
                protocol
                    .route_reply(reply, related_task.as_deref(), &request_id)
                    .await;
            }
            if let Ok(mut incoming) = protocol.shared.incoming.lock() {
                incoming.remove(&request_id);
            }
        });
    }

    /// Send a reply on the wire, or through the task queue when the request
    /// carried a related task.
    async fn route_reply(
        &self,
        reply: Message,
        related_task: Option<&str>,
        request_id: &RequestId,
    ) {
        if let Some(task_id) = related_task {
            let kind = if reply.is_error() {
                QueuedMessageKind::Error
            } else {
                QueuedMessageKind::Response
            };
            let queued = match serde_json::to_value(&reply) {
                Ok(body) => QueuedMessage::new(kind, body),
                Err(err) => {
                    self.emit_error(err.into());
                    return;
                }
            };
            if let Err(err) = self
                .enqueue_task_message(task_id, queued, self.session_id().as_deref())
                .await
            {
                self.emit_error(err);
            }
            return;
        }
        match self.transport() {
            Some(transport) => {
                if let Err(err) = transport.send(reply, Some(request_id)).await {
                    self.emit_error(McpError::internal(format!(
                        "failed to send reply: {err}"
                    )));
                }
            }
            None => self.emit_error(McpError::ConnectionClosed),
        }
    }

    async fn dispatch_notification(shared: &Arc<Shared<T>>, notification: Notification) {
        match notification.method() {
            notifications::CANCELLED => {
                let raw = notification
                    .params
                    .clone()
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                let params: CancelledParams = match serde_json::from_value(raw) {
                    Ok(params) => params,
                    Err(err) => {
                        Self::emit_error_shared(
                            shared,
                            McpError::format(format!("malformed cancelled notification: {err}")),
                        );
                        return;
                    }
                };
                let token = shared
                    .incoming
                    .lock()
                    .ok()
                    .and_then(|incoming| incoming.get(&RequestId::Number(params.request_id)).cloned());
                match token {
                    Some(token) => match params.reason {
                        Some(reason) => token.cancel_with_reason(reason),
                        None => token.cancel(),
                    },
                    None => {
                        trace!(request_id = params.request_id, "cancel for unknown request");
                    }
                }
            }
            notifications::PROGRESS => {
                let raw = notification
                    .params
                    .clone()
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                let params: ProgressParams = match serde_json::from_value(raw) {
                    Ok(params) => params,
                    Err(err) => {
                        Self::emit_error_shared(
                            shared,
                            McpError::format(format!(
                                "malformed progress notification (tokens must be integers): {err}"
                            )),
                        );
                        return;
                    }
                };
                let callback = shared
                    .progress
                    .lock()
                    .ok()
                    .and_then(|progress| {
                        progress
                            .get(&params.progress_token)
                            .map(|entry| Arc::clone(&entry.callback))
                    });
                match callback {
                    Some(callback) => callback(Progress {
                        progress: params.progress,
                        total: params.total,
                    }),
                    None => {
                        trace!(token = params.progress_token, "progress for unknown token");
                    }
                }
                Self::maybe_reset_timeout(shared, params.progress_token);
            }
            method => {
                let handler = shared
                    .notification_handlers
                    .lock()
                    .ok()
                    .and_then(|handlers| handlers.get(method).cloned())
                    .or_else(|| {
                        shared
                            .fallback_notification_handler
                            .lock()
                            .ok()
                            .and_then(|fallback| fallback.clone())
                    });
                let Some(handler) = handler else {
                    trace!(method, "unhandled notification");
                    return;
                };
                let shared = Arc::clone(shared);
                tokio::spawn(async move {
                    if let Err(err) = handler(notification).await {
                        Self::emit_error_shared(&shared, err);
                    }
                });
            }
        }
    }

    /// Re-arm a request's timer after progress, bounded by its max-total.
    fn maybe_reset_timeout(shared: &Arc<Shared<T>>, id: i64) {
        let Ok(mut pending) = shared.pending.lock() else {
            return;
        };
        let Some(entry) = pending.get_mut(&id) else {
            return;
        };
        if !entry.timeout.reset_on_progress {
            return;
        }
        entry.timeout.handle.abort();
        let delay = match entry.timeout.max_total {
            Some(max) => {
                let elapsed = entry.timeout.started.elapsed();
                entry.timeout.timeout.min(max.saturating_sub(elapsed))
            }
            None => entry.timeout.timeout,
        };
        trace!(id, ?delay, "re-arming request timeout after progress");
        entry.timeout.handle =
            Self::spawn_timeout_task(shared, id, delay, entry.timeout.timeout);
    }
}

impl<T: Transport + 'static> std::fmt::Debug for Protocol<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("options", &self.shared.options)
            .field("connected", &self.is_connected())
            .field("next_id", &self.shared.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_transport::MemoryTransport;

    #[tokio::test]
    async fn connect_twice_fails() {
        let (a, _b) = MemoryTransport::pair();
        let (c, _d) = MemoryTransport::pair();
        let protocol = Protocol::new(ProtocolOptions::new());
        protocol.connect(a).await.unwrap();
        let err = protocol.connect(c).await.unwrap_err();
        assert!(err.to_string().contains("already connected"));
    }

    #[tokio::test]
    async fn duplicate_handler_rejected_until_removed() {
        let protocol: Protocol<MemoryTransport> = Protocol::new(ProtocolOptions::new());
        protocol
            .set_request_handler("vendor/echo", |params: Value, _ctx| async move {
                Ok::<_, McpError>(params)
            })
            .unwrap();
        let err = protocol
            .set_request_handler("vendor/echo", |params: Value, _ctx| async move {
                Ok::<_, McpError>(params)
            })
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));

        protocol.remove_request_handler("vendor/echo");
        protocol
            .set_request_handler("vendor/echo", |params: Value, _ctx| async move {
                Ok::<_, McpError>(params)
            })
            .unwrap();
    }

    #[tokio::test]
    async fn handler_registration_asserts_local_capability() {
        let protocol: Protocol<MemoryTransport> = Protocol::new(ProtocolOptions::new());
        let err = protocol
            .set_request_handler("tools/call", |params: Value, _ctx| async move {
                Ok::<_, McpError>(params)
            })
            .unwrap_err();
        assert!(err.to_string().contains("tools"));
    }

    #[tokio::test]
    async fn request_ids_are_monotonic() {
        let protocol: Protocol<MemoryTransport> = Protocol::new(ProtocolOptions::new());
        let first = protocol.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let second = protocol.shared.next_id.fetch_add(1, Ordering::SeqCst);
        assert!(second > first);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (a, _b) = MemoryTransport::pair();
        let protocol = Protocol::new(ProtocolOptions::new());
        protocol.connect(a).await.unwrap();
        protocol.close().await.unwrap();
        protocol.close().await.unwrap();
        assert!(!protocol.is_connected());
    }
}
