//! The primary error type for the mcpflow runtime.
//!
//! The taxonomy is deliberately closed: everything that can go wrong inside
//! the protocol engine is one of five shapes, and only [`McpError::Protocol`]
//! is ever visible on the wire.

use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

use super::codes;

/// The primary error type for the mcpflow runtime.
///
/// Wire-visible peer errors arrive and leave as [`McpError::Protocol`] with
/// their code, message, and data preserved verbatim. The remaining variants
/// are local conditions: connection teardown, timeouts, caller aborts, and
/// malformed wire input.
#[derive(Error, Diagnostic, Debug)]
pub enum McpError {
    /// The connection closed while a request was in flight.
    #[error("Connection closed")]
    #[diagnostic(
        code(mcpflow::connection_closed),
        help("The transport shut down before the request completed")
    )]
    ConnectionClosed,

    /// A request did not receive a response within its timeout.
    #[error("Request timed out after {timeout:?}")]
    #[diagnostic(
        code(mcpflow::request_timeout),
        help("Consider increasing the timeout or enabling reset_timeout_on_progress")
    )]
    RequestTimeout {
        /// How long we waited before timing out.
        timeout: Duration,
    },

    /// The caller aborted the request via its signal.
    #[error("Request aborted{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    #[diagnostic(code(mcpflow::aborted))]
    Aborted {
        /// Reason passed to the abort signal, if any.
        reason: Option<String>,
    },

    /// A protocol-level error: either reported by the peer or destined for
    /// the wire as a JSON-RPC error object.
    #[error("{message} (code {code})")]
    #[diagnostic(code(mcpflow::protocol))]
    Protocol {
        /// JSON-RPC error code.
        code: i32,
        /// Error message.
        message: String,
        /// Additional error data.
        data: Option<serde_json::Value>,
    },

    /// A wire value that does not fit the message envelope rules.
    #[error("Format error: {message}")]
    #[diagnostic(
        code(mcpflow::format),
        help("Ensure the message is valid JSON-RPC 2.0 format")
    )]
    Format {
        /// Human-readable description of the violation.
        message: String,
    },
}

impl McpError {
    /// Create a protocol error with an arbitrary code.
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a protocol error with attached data.
    pub fn protocol_with_data(
        code: i32,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a "method not found" error (-32601).
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::protocol(codes::METHOD_NOT_FOUND, message)
    }

    /// Create an "invalid params" error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::protocol(codes::INVALID_PARAMS, message)
    }

    /// Create an "invalid request" error (-32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::protocol(codes::INVALID_REQUEST, message)
    }

    /// Create an "internal error" (-32603).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::protocol(codes::INTERNAL_ERROR, message)
    }

    /// Create a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create an aborted error without a reason.
    #[must_use]
    pub const fn aborted() -> Self {
        Self::Aborted { reason: None }
    }

    /// Create an aborted error carrying the caller's reason.
    pub fn aborted_with_reason(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: Some(reason.into()),
        }
    }

    /// Get the JSON-RPC error code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::ConnectionClosed => codes::CONNECTION_CLOSED,
            Self::RequestTimeout { .. } => codes::REQUEST_TIMEOUT,
            Self::Aborted { .. } => codes::INTERNAL_ERROR,
            Self::Protocol { code, .. } => *code,
            Self::Format { .. } => codes::PARSE_ERROR,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format {
            message: err.to_string(),
        }
    }
}
