//! A scripted transport for driving a protocol in tests.
//!
//! The transport records everything sent through it and answers requests
//! from per-method reply queues. Methods without a script are left
//! unanswered, which is exactly what timeout tests want. Server-initiated
//! traffic (progress notifications, incoming requests) is pushed in with
//! [`ScriptedTransport::inject`].
//!
//! Clones share state: keep one clone in the test and hand the other to
//! `Protocol::connect`.

use async_lock::Mutex as AsyncMutex;
use mcpflow_core::error::JsonRpcError;
use mcpflow_core::protocol::{ErrorResponse, Message, RequestId, Response};
use mcpflow_transport::{Transport, TransportError, TransportMetadata};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

enum ScriptedReply {
    Result(Value),
    Error(JsonRpcError),
}

struct Inner {
    incoming_tx: futures::channel::mpsc::UnboundedSender<Message>,
    incoming_rx: AsyncMutex<futures::channel::mpsc::UnboundedReceiver<Message>>,
    sent: Mutex<Vec<Message>>,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    connected: AtomicBool,
    session_id: String,
}

/// A transport whose peer is a script.
///
/// # Example
///
/// ```rust
/// use mcpflow_testing::ScriptedTransport;
///
/// let transport = ScriptedTransport::new()
///     .reply("ping", serde_json::json!({}))
///     .replies("tasks/get", [
///         serde_json::json!({ "taskId": "t1", "status": "working",
///                             "createdAt": "2026-01-01T00:00:00Z" }),
///         serde_json::json!({ "taskId": "t1", "status": "completed",
///                             "createdAt": "2026-01-01T00:00:00Z" }),
///     ]);
/// let handle = transport.clone();
/// ```
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Create a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = futures::channel::mpsc::unbounded();
        Self {
            inner: Arc::new(Inner {
                incoming_tx,
                incoming_rx: AsyncMutex::new(incoming_rx),
                sent: Mutex::new(Vec::new()),
                scripts: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(true),
                session_id: uuid::Uuid::new_v4().to_string(),
            }),
        }
    }

    /// Script one successful reply for a method.
    #[must_use]
    pub fn reply(self, method: &str, result: Value) -> Self {
        self.push_reply(method, ScriptedReply::Result(result));
        self
    }

    /// Script a sequence of successful replies for a method, consumed in
    /// order across successive requests.
    #[must_use]
    pub fn replies(self, method: &str, results: impl IntoIterator<Item = Value>) -> Self {
        for result in results {
            self.push_reply(method, ScriptedReply::Result(result));
        }
        self
    }

    /// Script an error reply for a method.
    #[must_use]
    pub fn reply_error(self, method: &str, error: JsonRpcError) -> Self {
        self.push_reply(method, ScriptedReply::Error(error));
        self
    }

    fn push_reply(&self, method: &str, reply: ScriptedReply) {
        if let Ok(mut scripts) = self.inner.scripts.lock() {
            scripts.entry(method.to_string()).or_default().push_back(reply);
        }
    }

    /// Push a peer-initiated message into the receive stream.
    pub fn inject(&self, message: Message) {
        let _ = self.inner.incoming_tx.unbounded_send(message);
    }

    /// Everything sent through this transport so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        self.inner
            .sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Sent notifications matching a method.
    #[must_use]
    pub fn sent_notifications(&self, method: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|msg| msg.is_notification() && msg.method() == Some(method))
            .collect()
    }

    /// Sent requests matching a method.
    #[must_use]
    pub fn sent_requests(&self, method: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|msg| msg.is_request() && msg.method() == Some(method))
            .collect()
    }

    fn auto_reply(&self, method: &str, id: &RequestId) {
        let reply = self
            .inner
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(method).and_then(VecDeque::pop_front));
        let Some(reply) = reply else { return };
        let message = match reply {
            ScriptedReply::Result(result) => {
                Message::Response(Response::new(id.clone(), result))
            }
            ScriptedReply::Error(error) => {
                Message::Error(ErrorResponse::new(id.clone(), error))
            }
        };
        self.inject(message);
    }
}

impl Transport for ScriptedTransport {
    type Error = TransportError;

    async fn start(&self) -> Result<(), Self::Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    async fn send(
        &self,
        msg: Message,
        _related_request_id: Option<&RequestId>,
    ) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if let Ok(mut sent) = self.inner.sent.lock() {
            sent.push(msg.clone());
        }
        if let Message::Request(request) = &msg {
            self.auto_reply(request.method(), &request.id);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        use futures::StreamExt;

        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut receiver = self.inner.incoming_rx.lock().await;
        Ok(receiver.next().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.incoming_tx.close_channel();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        Some(self.inner.session_id.clone())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn metadata(&self) -> TransportMetadata {
        TransportMetadata::new("scripted").connected_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_core::protocol::Request;

    #[tokio::test]
    async fn scripted_reply_round_trip() {
        let transport = ScriptedTransport::new().reply("ping", serde_json::json!({}));

        transport
            .send(Message::Request(Request::new("ping", 1)), None)
            .await
            .unwrap();

        let reply = transport.recv().await.unwrap().unwrap();
        match reply {
            Message::Response(response) => assert_eq!(response.id, RequestId::Number(1)),
            other => panic!("expected response, got {other:?}"),
        }
        assert_eq!(transport.sent_requests("ping").len(), 1);
    }

    #[tokio::test]
    async fn unscripted_methods_stay_silent() {
        let transport = ScriptedTransport::new();
        transport
            .send(Message::Request(Request::new("tools/list", 1)), None)
            .await
            .unwrap();
        // Nothing injected: recv would block, so only check the record.
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn replies_consumed_in_order() {
        let transport = ScriptedTransport::new().replies(
            "tasks/get",
            [serde_json::json!({"n": 1}), serde_json::json!({"n": 2})],
        );

        for id in 1..=2 {
            transport
                .send(Message::Request(Request::new("tasks/get", id)), None)
                .await
                .unwrap();
        }
        let first = transport.recv().await.unwrap().unwrap();
        let second = transport.recv().await.unwrap().unwrap();
        match (first, second) {
            (Message::Response(a), Message::Response(b)) => {
                assert_eq!(a.result["n"], 1);
                assert_eq!(b.result["n"], 2);
            }
            other => panic!("expected two responses, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clones_share_state() {
        let transport = ScriptedTransport::new();
        let handle = transport.clone();
        transport
            .send(Message::Request(Request::new("ping", 1)), None)
            .await
            .unwrap();
        assert_eq!(handle.sent().len(), 1);
    }
}
