//! Standard JSON-RPC and MCP error codes.
//!
//! This module defines error code constants used in JSON-RPC 2.0 responses
//! and MCP-specific error responses.

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

/// Server error range start.
pub const SERVER_ERROR_START: i32 = -32000;

/// Server error range end.
pub const SERVER_ERROR_END: i32 = -32099;

// MCP-specific codes

/// The request requires completing one or more URL-mode elicitations first.
///
/// The error `data` carries `elicitations`, an array of url-elicitation
/// parameter objects.
pub const URL_ELICITATION_REQUIRED: i32 = -32042;

/// The connection closed before a response arrived.
pub const CONNECTION_CLOSED: i32 = -32000;

/// The request was cancelled locally before completion.
pub const REQUEST_CANCELLED: i32 = -32800;

/// The request timed out waiting for a response.
pub const REQUEST_TIMEOUT: i32 = -32801;
