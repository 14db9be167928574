//! Unified error handling for the mcpflow runtime.
//!
//! All fallible operations in the workspace return [`McpError`]. The
//! taxonomy is closed (§ five variants): connection teardown, request
//! timeout, caller abort, wire-visible protocol errors, and envelope format
//! violations. Peer-reported errors round-trip through
//! [`JsonRpcError`] with code, message, and data preserved verbatim.
//!
//! # Example
//!
//! ```rust
//! use mcpflow_core::error::{codes, JsonRpcError, McpError};
//!
//! let err = McpError::method_not_found("no handler for tools/call");
//! assert_eq!(err.code(), codes::METHOD_NOT_FOUND);
//!
//! let wire: JsonRpcError = (&err).into();
//! assert_eq!(wire.code, -32601);
//! ```

pub mod codes;
mod jsonrpc;
mod types;

pub use jsonrpc::JsonRpcError;
pub use types::McpError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping() {
        assert_eq!(McpError::ConnectionClosed.code(), codes::CONNECTION_CLOSED);
        assert_eq!(
            McpError::RequestTimeout {
                timeout: std::time::Duration::from_millis(100)
            }
            .code(),
            codes::REQUEST_TIMEOUT
        );
        assert_eq!(McpError::format("bad").code(), codes::PARSE_ERROR);
        assert_eq!(
            McpError::method_not_found("x").code(),
            codes::METHOD_NOT_FOUND
        );
        assert_eq!(McpError::invalid_params("x").code(), codes::INVALID_PARAMS);
    }

    #[test]
    fn timeout_carries_millis_data() {
        let err = McpError::RequestTimeout {
            timeout: std::time::Duration::from_millis(250),
        };
        let wire: JsonRpcError = (&err).into();
        assert_eq!(wire.code, codes::REQUEST_TIMEOUT);
        assert_eq!(wire.data.unwrap()["timeout"], 250);
    }

    #[test]
    fn protocol_error_round_trips_verbatim() {
        let wire = JsonRpcError::new(-32042, "elicitation required")
            .with_data(serde_json::json!({ "url": "https://example.com" }));
        let err: McpError = wire.clone().into();
        assert_eq!(err.code(), -32042);
        let back: JsonRpcError = err.into();
        assert_eq!(back, wire);
    }

    #[test]
    fn aborted_display_includes_reason() {
        let err = McpError::aborted_with_reason("user clicked stop");
        assert!(err.to_string().contains("user clicked stop"));
        assert_eq!(McpError::aborted().to_string(), "Request aborted");
    }
}
