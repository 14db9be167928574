//! JSON-RPC 2.0 envelope types for the Model Context Protocol.
//!
//! This module provides the message framing used for all MCP communication.
//! Every wire message is one of four shapes:
//!
//! - **Request**: a method call expecting a response, carrying an id
//! - **Response**: a successful reply, correlated by id
//! - **Error**: a failed reply, correlated by id
//! - **Notification**: a one-way message with no id
//!
//! Parsing is strict: `jsonrpc` must equal `"2.0"`, and a value that fits
//! none of the four shapes is rejected with [`McpError::Format`].
//!
//! # Example
//!
//! ```rust
//! use mcpflow_core::protocol::{Message, Request, RequestId};
//!
//! let request = Request::new("tools/list", RequestId::Number(1));
//!
//! let json = r#"{"jsonrpc": "2.0", "id": 1, "result": {}}"#;
//! let message: Message = serde_json::from_str(json).unwrap();
//! assert!(message.is_response());
//! ```

use crate::error::{JsonRpcError, McpError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// The JSON-RPC version string. Always "2.0".
pub const JSONRPC_VERSION: &str = "2.0";

/// Key under which protocol metadata rides inside `params` or `result`.
pub const META_KEY: &str = "_meta";

/// A JSON-RPC request ID.
///
/// Request IDs correlate requests with their responses. The wire format
/// admits numbers, strings, and null; this engine only ever *emits*
/// monotonically increasing numeric ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID (the only kind this engine allocates).
    Number(i64),
    /// String request ID from a peer.
    String(String),
    /// Null id, seen on error replies to unparseable requests.
    Null,
}

impl RequestId {
    /// The numeric value, if this is a numeric id.
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// The JSON-RPC version. Always "2.0".
    pub jsonrpc: Cow<'static, str>,
    /// The request ID for correlation.
    pub id: RequestId,
    /// The method to invoke.
    pub method: Cow<'static, str>,
    /// The method parameters, if any. `_meta` lives inside this object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a new request with no parameters.
    #[must_use]
    pub fn new(method: impl Into<Cow<'static, str>>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Create a new request with parameters.
    #[must_use]
    pub fn with_params(
        method: impl Into<Cow<'static, str>>,
        id: impl Into<RequestId>,
        params: Value,
    ) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Get the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The `_meta` object inside `params`, if present.
    #[must_use]
    pub fn meta(&self) -> Option<&Value> {
        self.params.as_ref()?.get(META_KEY)
    }

    /// Insert a `_meta` entry, materializing `params` and `_meta` as needed.
    pub fn set_meta_entry(&mut self, key: impl Into<String>, value: Value) {
        set_meta_entry(&mut self.params, key.into(), value);
    }

    /// Attach a progress token (`_meta.progressToken`).
    pub fn set_progress_token(&mut self, token: i64) {
        self.set_meta_entry("progressToken", Value::from(token));
    }

    /// Mark this request as belonging to a task's side channel
    /// (`_meta.relatedTask.taskId`).
    pub fn set_related_task(&mut self, task_id: &str) {
        self.set_meta_entry("relatedTask", serde_json::json!({ "taskId": task_id }));
    }

    /// The related task id (`_meta.relatedTask.taskId`), if present.
    #[must_use]
    pub fn related_task(&self) -> Option<&str> {
        self.meta()?.get("relatedTask")?.get("taskId")?.as_str()
    }

    /// The task id this request executes under (`_meta.taskId`), if present.
    #[must_use]
    pub fn meta_task_id(&self) -> Option<&str> {
        self.meta()?.get("taskId")?.as_str()
    }

    /// The task-augmentation object (`params.task`), if present.
    #[must_use]
    pub fn task_params(&self) -> Option<&Value> {
        self.params.as_ref()?.get("task")
    }

    /// Attach a task-augmentation object under `params.task`.
    pub fn set_task_params(&mut self, task: Value) {
        params_object(&mut self.params).insert("task".to_string(), task);
    }
}

/// A successful JSON-RPC 2.0 reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The JSON-RPC version. Always "2.0".
    pub jsonrpc: Cow<'static, str>,
    /// The request ID this response corresponds to.
    pub id: RequestId,
    /// The result payload. `_meta` lives inside this object.
    pub result: Value,
}

impl Response {
    /// Create a successful response.
    #[must_use]
    pub fn new(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            result,
        }
    }

    /// The `_meta` object inside `result`, if present.
    #[must_use]
    pub fn meta(&self) -> Option<&Value> {
        self.result.get(META_KEY)
    }

    /// Insert a `_meta` entry into the result object.
    pub fn set_meta_entry(&mut self, key: impl Into<String>, value: Value) {
        if !self.result.is_object() {
            self.result = Value::Object(Map::new());
        }
        let meta = self
            .result
            .as_object_mut()
            .and_then(|result| {
                result
                    .entry(META_KEY)
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
            });
        if let Some(meta) = meta {
            meta.insert(key.into(), value);
        }
    }

    /// The related task id (`result._meta.relatedTask.taskId`), if present.
    #[must_use]
    pub fn related_task(&self) -> Option<&str> {
        self.meta()?.get("relatedTask")?.get("taskId")?.as_str()
    }
}

/// A failed JSON-RPC 2.0 reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The JSON-RPC version. Always "2.0".
    pub jsonrpc: Cow<'static, str>,
    /// The request ID this reply corresponds to.
    pub id: RequestId,
    /// The error payload.
    pub error: JsonRpcError,
}

impl ErrorResponse {
    /// Create an error reply.
    #[must_use]
    pub fn new(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: id.into(),
            error,
        }
    }
}

/// A JSON-RPC 2.0 notification message.
///
/// Notifications are one-way messages that do not expect a response.
/// They have no ID field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// The JSON-RPC version. Always "2.0".
    pub jsonrpc: Cow<'static, str>,
    /// The notification method.
    pub method: Cow<'static, str>,
    /// The notification parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Create a new notification with no parameters.
    #[must_use]
    pub fn new(method: impl Into<Cow<'static, str>>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            method: method.into(),
            params: None,
        }
    }

    /// Create a new notification with parameters.
    #[must_use]
    pub fn with_params(method: impl Into<Cow<'static, str>>, params: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Get the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The `_meta` object inside `params`, if present.
    #[must_use]
    pub fn meta(&self) -> Option<&Value> {
        self.params.as_ref()?.get(META_KEY)
    }

    /// Insert a `_meta` entry, materializing `params` and `_meta` as needed.
    pub fn set_meta_entry(&mut self, key: impl Into<String>, value: Value) {
        set_meta_entry(&mut self.params, key.into(), value);
    }

    /// The related task id (`_meta.relatedTask.taskId`), if present.
    #[must_use]
    pub fn related_task(&self) -> Option<&str> {
        self.meta()?.get("relatedTask")?.get("taskId")?.as_str()
    }

    /// Whether `params` is absent or an empty object (debounce eligibility).
    #[must_use]
    pub fn params_is_empty(&self) -> bool {
        match &self.params {
            None => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }
}

fn params_object(params: &mut Option<Value>) -> &mut Map<String, Value> {
    if !matches!(params, Some(Value::Object(_))) {
        *params = Some(Value::Object(Map::new()));
    }
    match params {
        Some(Value::Object(map)) => map,
        _ => unreachable!("params was just set to an object"),
    }
}

fn set_meta_entry(params: &mut Option<Value>, key: String, value: Value) {
    let map = params_object(params);
    let meta = map
        .entry(META_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(meta) = meta.as_object_mut() {
        meta.insert(key, value);
    }
}

/// A parsed JSON-RPC 2.0 message.
///
/// This is the closed sum over the four wire shapes. Deserialization is
/// strict (see [`Message::from_value`]); serialization emits the contained
/// variant unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// A request message.
    Request(Request),
    /// A successful reply.
    Response(Response),
    /// A failed reply.
    Error(ErrorResponse),
    /// A notification message.
    Notification(Notification),
}

impl Message {
    /// Parse a message from a JSON value, enforcing the envelope rules.
    ///
    /// Dispatch: `method` with `id` is a request, `method` without `id` a
    /// notification, `error` an error reply, `result` a response. Anything
    /// else, and any value whose `jsonrpc` field is not exactly `"2.0"`,
    /// fails with [`McpError::Format`].
    pub fn from_value(value: Value) -> Result<Self, McpError> {
        let Some(object) = value.as_object() else {
            return Err(McpError::format("message is not a JSON object"));
        };
        match object.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            Some(other) => {
                return Err(McpError::format(format!(
                    "unsupported jsonrpc version: {other:?}"
                )));
            }
            None => return Err(McpError::format("missing jsonrpc field")),
        }

        let parsed = if object.contains_key("method") {
            if object.contains_key("id") {
                serde_json::from_value::<Request>(value).map(Self::Request)
            } else {
                serde_json::from_value::<Notification>(value).map(Self::Notification)
            }
        } else if object.contains_key("error") {
            serde_json::from_value::<ErrorResponse>(value).map(Self::Error)
        } else if object.contains_key("result") {
            serde_json::from_value::<Response>(value).map(Self::Response)
        } else {
            return Err(McpError::format(
                "message is neither request, response, nor notification",
            ));
        };

        parsed.map_err(|e| McpError::format(format!("malformed message envelope: {e}")))
    }

    /// Get the method name if this is a request or notification.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) | Self::Error(_) => None,
        }
    }

    /// Get the request ID if this message carries one.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Error(e) => Some(&e.id),
            Self::Notification(_) => None,
        }
    }

    /// Check if this is a request.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// Check if this is a successful reply.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Check if this is an error reply.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Check if this is a notification.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Self::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

impl From<ErrorResponse> for Message {
    fn from(e: ErrorResponse) -> Self {
        Self::Error(e)
    }
}

impl From<Notification> for Message {
    fn from(n: Notification) -> Self {
        Self::Notification(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_serialization() {
        let request = Request::new("tools/list", 1);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn message_dispatch() {
        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some("ping"));

        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(msg.is_response());

        let msg: Message = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}"#,
        )
        .unwrap();
        assert!(msg.is_error());

        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(msg.is_notification());
    }

    #[test]
    fn rejects_bad_version() {
        let err = Message::from_value(serde_json::json!({
            "jsonrpc": "1.0", "id": 1, "method": "ping"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("jsonrpc"));
    }

    #[test]
    fn rejects_shapeless_message() {
        assert!(Message::from_value(serde_json::json!({ "jsonrpc": "2.0", "id": 3 })).is_err());
        assert!(Message::from_value(serde_json::json!([1, 2, 3])).is_err());
    }

    #[test]
    fn round_trips_every_variant() {
        let samples = [
            serde_json::json!({"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"x","_meta":{"progressToken":7}}}),
            serde_json::json!({"jsonrpc":"2.0","id":"abc","result":{"ok":true,"_meta":{"relatedTask":{"taskId":"t1"}}}}),
            serde_json::json!({"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"parse error"}}),
            serde_json::json!({"jsonrpc":"2.0","method":"notifications/progress","params":{"progressToken":7,"progress":1}}),
        ];
        for raw in samples {
            let parsed = Message::from_value(raw.clone()).unwrap();
            let back = serde_json::to_value(&parsed).unwrap();
            assert_eq!(back, raw);
            let reparsed = Message::from_value(back).unwrap();
            assert_eq!(reparsed, parsed);
        }
    }

    #[test]
    fn request_id_null() {
        let id: RequestId = serde_json::from_str("null").unwrap();
        assert_eq!(id, RequestId::Null);
        assert_eq!(serde_json::to_string(&id).unwrap(), "null");
    }

    #[test]
    fn meta_helpers() {
        let mut request = Request::new("tools/call", 9);
        request.set_progress_token(9);
        request.set_related_task("t42");
        request.set_task_params(serde_json::json!({ "ttl": 60000 }));

        assert_eq!(request.related_task(), Some("t42"));
        assert_eq!(
            request.meta().unwrap().get("progressToken"),
            Some(&Value::from(9))
        );
        assert_eq!(
            request.task_params(),
            Some(&serde_json::json!({ "ttl": 60000 }))
        );
    }

    #[test]
    fn response_meta() {
        let mut response = Response::new(1, serde_json::json!({ "ok": true }));
        assert!(response.meta().is_none());
        response.set_meta_entry("relatedTask", serde_json::json!({ "taskId": "t1" }));
        assert_eq!(response.related_task(), Some("t1"));
    }

    #[test]
    fn notification_params_emptiness() {
        assert!(Notification::new("notifications/initialized").params_is_empty());
        assert!(
            Notification::with_params("n", serde_json::json!({})).params_is_empty()
        );
        assert!(
            !Notification::with_params("n", serde_json::json!({"a": 1})).params_is_empty()
        );
    }
}
