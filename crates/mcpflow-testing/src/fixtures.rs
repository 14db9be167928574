//! Canned payloads for protocol tests.

use mcpflow_core::capability::{Capabilities, Implementation, InitializeResult};
use serde_json::Value;

/// An initialize result from a server declaring the given capabilities.
#[must_use]
pub fn initialize_result(capabilities: Capabilities) -> Value {
    let result = InitializeResult::new(
        Implementation::new("scripted-server", "0.0.1"),
        capabilities,
    );
    serde_json::to_value(result).unwrap_or(Value::Null)
}

/// An initialize result for a server with no capabilities at all.
#[must_use]
pub fn bare_initialize_result() -> Value {
    initialize_result(Capabilities::new())
}

/// A task body in wire shape.
#[must_use]
pub fn task_json(task_id: &str, status: &str, poll_interval_ms: Option<u64>) -> Value {
    let mut task = serde_json::json!({
        "taskId": task_id,
        "status": status,
        "createdAt": "2026-01-01T00:00:00Z",
    });
    if let Some(interval) = poll_interval_ms {
        task["pollInterval"] = Value::from(interval);
    }
    task
}

/// A `CreateTaskResult` body in wire shape.
#[must_use]
pub fn create_task_result(task_id: &str, poll_interval_ms: Option<u64>) -> Value {
    serde_json::json!({ "task": task_json(task_id, "working", poll_interval_ms) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_core::capability::PROTOCOL_VERSION;

    #[test]
    fn initialize_result_is_wire_shaped() {
        let value = initialize_result(Capabilities::new().with_tools().with_logging());
        assert_eq!(value["protocolVersion"], PROTOCOL_VERSION);
        assert!(value.get("serverInfo").is_some());
        assert!(value["capabilities"].get("tools").is_some());
        assert!(value["capabilities"].get("logging").is_some());

        let bare = bare_initialize_result();
        assert_eq!(bare["capabilities"], serde_json::json!({}));
    }

    #[test]
    fn task_fixture_shape() {
        let value = create_task_result("t1", Some(10));
        assert_eq!(value["task"]["taskId"], "t1");
        assert_eq!(value["task"]["pollInterval"], 10);
    }
}
