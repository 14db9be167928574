//! Standard JSON-RPC and MCP error codes.
//!
//! This module defines error code constants used in JSON-RPC 2.0 responses
//! and MCP-specific error responses.

/// The connection closed before the request completed.
pub const CONNECTION_CLOSED: i32 = -32000;

/// The request did not complete within its timeout.
pub const REQUEST_TIMEOUT: i32 = -32001;

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i32 = -32600;

/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;

/// The request requires a URL-mode elicitation round trip first.
pub const URL_ELICITATION_REQUIRED: i32 = -32042;
