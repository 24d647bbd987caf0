//! # JSON-RPC 2.0 Wire Types
//!
//! The request/response/error frames every node speaks. The router wraps
//! wallet traffic rather than interpreting it, so `method` is a plain
//! string here — the typed surface lives one layer up.
//!
//! One extension to stock JSON-RPC: requests may carry a `_context` field
//! holding a forwarded [`TransportContext`]. A context that arrives inside
//! the frame is *never* trusted; the receiving node forces
//! `trusted_source = false` on it during resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config;
use crate::transport::TransportContext;

// ---------------------------------------------------------------------------
// Request Identifiers
// ---------------------------------------------------------------------------

/// A JSON-RPC request id: integer or string.
///
/// Integer ids are what this crate generates (monotonic per node); string
/// ids are accepted because JSON-RPC allows peers to use them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id. The common case for locally-generated requests.
    Number(u64),
    /// String id, as some peers prefer.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request or notification.
///
/// A missing `id` makes the frame a notification: no response will be sent
/// and none is expected. The `params` field is an opaque JSON value — the
/// registered handler (or its serializer) is responsible for decoding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// Request identifier. Absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// The method to invoke.
    pub method: String,
    /// Method-specific parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Forwarded transport context. Untrusted by definition.
    #[serde(
        rename = "_context",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub context: Option<TransportContext>,
}

impl RpcRequest {
    /// Creates a request expecting a response.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: config::JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
            context: None,
        }
    }

    /// Creates a notification (no id, no response).
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: config::JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
            context: None,
        }
    }

    /// True if this frame expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 response.
///
/// Exactly one of `result` or `error` is set; both present or both absent
/// is a protocol violation from a conforming peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// The request id this response answers.
    pub id: RequestId,
    /// The successful result, if the method completed without error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error, if the method failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl RpcResponse {
    /// Creates a successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: config::JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn failure(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: config::JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Collapses the response into a `Result`, treating a frame with
    /// neither field as an internal error.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match (self.result, self.error) {
            (Some(value), None) => Ok(value),
            (None, Some(error)) => Err(error),
            _ => Err(ErrorObject::internal_error(
                "response carried neither result nor error",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Error Object
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 error object.
///
/// Standard codes:
/// - `-32700`: Parse error
/// - `-32600`: Invalid request
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
///
/// Router-specific codes live in [`crate::error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// An error with the given code and message, no data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// An error carrying structured data.
    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// JSON parse error.
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, msg)
    }

    /// Invalid JSON-RPC request structure.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    /// The requested method does not exist.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            format!("method not found: {}", method.into()),
        )
    }

    /// Invalid method parameters.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Internal server error.
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code, self.message)
    }
}

/// Standard JSON-RPC 2.0 error codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// Frame Classification
// ---------------------------------------------------------------------------

/// An inbound frame, classified.
#[derive(Debug)]
pub enum RpcMessage {
    /// A request or notification addressed to this node.
    Request(RpcRequest),
    /// A response to a call this node made.
    Response(RpcResponse),
}

impl RpcMessage {
    /// Parse raw bytes into a classified frame.
    ///
    /// The version field must be exactly "2.0". A frame with a `method` key
    /// is a request; a frame with `result` or `error` is a response.
    pub fn parse(raw: &[u8]) -> Result<Self, ErrorObject> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| ErrorObject::parse_error(format!("invalid JSON: {e}")))?;

        let obj = value
            .as_object()
            .ok_or_else(|| ErrorObject::invalid_request("frame is not a JSON object"))?;

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(config::JSONRPC_VERSION) {
            return Err(ErrorObject::invalid_request("missing or wrong jsonrpc version"));
        }

        if obj.contains_key("method") {
            let request: RpcRequest = serde_json::from_value(value)
                .map_err(|e| ErrorObject::invalid_request(format!("malformed request: {e}")))?;
            Ok(RpcMessage::Request(request))
        } else if obj.contains_key("result") || obj.contains_key("error") {
            let response: RpcResponse = serde_json::from_value(value)
                .map_err(|e| ErrorObject::invalid_request(format!("malformed response: {e}")))?;
            Ok(RpcMessage::Response(response))
        } else {
            Err(ErrorObject::invalid_request(
                "frame is neither request nor response",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialization_roundtrip() {
        let req = RpcRequest::new(RequestId::Number(1), "wm_call", Some(json!({"a": 1})));
        let bytes = serde_json::to_vec(&req).unwrap();
        match RpcMessage::parse(&bytes).unwrap() {
            RpcMessage::Request(parsed) => {
                assert_eq!(parsed.method, "wm_call");
                assert_eq!(parsed.id, Some(RequestId::Number(1)));
                assert_eq!(parsed.params, Some(json!({"a": 1})));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn notifications_have_no_id() {
        let note = RpcRequest::notification("wm_sessionTerminated", None);
        assert!(note.is_notification());
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_none());
    }

    #[test]
    fn response_classification() {
        let ok = serde_json::to_vec(&RpcResponse::success(RequestId::Number(7), json!("0xabc")))
            .unwrap();
        match RpcMessage::parse(&ok).unwrap() {
            RpcMessage::Response(resp) => {
                assert_eq!(resp.into_result().unwrap(), json!("0xabc"));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn error_response_roundtrip() {
        let resp = RpcResponse::failure(
            RequestId::String("abc".into()),
            ErrorObject::method_not_found("nope"),
        );
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn rejects_wrong_version() {
        let frame = br#"{"jsonrpc":"1.0","method":"m","id":1}"#;
        let err = RpcMessage::parse(frame).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn rejects_non_object_frames() {
        assert!(RpcMessage::parse(b"[1,2,3]").is_err());
        assert!(RpcMessage::parse(b"not json at all").is_err());
    }

    #[test]
    fn embedded_context_is_parsed() {
        let frame = br#"{"jsonrpc":"2.0","method":"m","id":1,"_context":{"origin":"https://x.example","trusted_source":true}}"#;
        match RpcMessage::parse(frame).unwrap() {
            RpcMessage::Request(req) => {
                let ctx = req.context.unwrap();
                assert_eq!(ctx.origin, "https://x.example");
                // The parser preserves the field; trust is stripped during
                // context resolution in the node, not here.
                assert!(ctx.trusted_source);
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn request_id_accepts_strings_and_numbers() {
        let n: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(n, RequestId::Number(42));
        let s: RequestId = serde_json::from_str("\"req-1\"").unwrap();
        assert_eq!(s, RequestId::String("req-1".into()));
        assert_eq!(n.to_string(), "42");
        assert_eq!(s.to_string(), "req-1");
    }
}
