//! # Router Error Taxonomy
//!
//! The stable set of error kinds a dApp can branch on. Every failure that
//! crosses the router's wire surface is one of these; downstream wallet
//! errors are rewrapped with their original code and message preserved
//! under `data.cause`.
//!
//! Numeric codes are part of the release contract — they extend the
//! JSON-RPC server-error range and must not be renumbered within a release
//! line. The string kind (`data.kind`, and the `code` field of bulk-entry
//! errors) is the human-facing half of the same contract.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::jsonrpc::message::{self, ErrorObject};

// ---------------------------------------------------------------------------
// Wire Codes
// ---------------------------------------------------------------------------

/// Router-specific numeric codes, in the JSON-RPC server-error range.
pub mod codes {
    /// Malformed params or missing required field.
    pub const INVALID_REQUEST: i64 = -32600;
    /// `chain_id` has no configured proxy.
    pub const UNKNOWN_CHAIN: i64 = -32010;
    /// Unknown, expired, or wrong-origin session.
    pub const INVALID_SESSION: i64 = -32011;
    /// Method denied by policy or by the user.
    pub const INSUFFICIENT_PERMISSIONS: i64 = -32012;
    /// Downstream wallet does not implement the method.
    pub const METHOD_NOT_SUPPORTED: i64 = -32013;
    /// Transport to the backend failed.
    pub const WALLET_NOT_AVAILABLE: i64 = -32014;
    /// At least one sub-call of a bulk op failed.
    pub const PARTIAL_FAILURE: i64 = -32015;
    /// Call or approval exceeded its deadline.
    pub const REQUEST_TIMEOUT: i64 = -32016;
    /// Anything not classified above.
    pub const UNKNOWN_ERROR: i64 = -32099;
}

// ---------------------------------------------------------------------------
// Bulk Entries
// ---------------------------------------------------------------------------

/// One slot of a `wm_bulkCall` result: the sub-call's value, or its error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BulkEntry {
    /// The sub-call failed. Listed first so untagged deserialization
    /// prefers it for `{"error": ...}` shapes.
    Failure {
        /// The error for this slot.
        error: BulkError,
    },
    /// The sub-call succeeded with this value.
    Success(Value),
}

impl BulkEntry {
    /// True if this slot holds a successful result.
    pub fn is_success(&self) -> bool {
        matches!(self, BulkEntry::Success(_))
    }
}

/// The error recorded in a failed bulk slot. `code` is the string kind
/// (e.g. `"MethodNotSupported"`), not the numeric wire code, so bulk
/// results stay readable without a code table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkError {
    /// The router error kind.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured detail, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// RouterError
// ---------------------------------------------------------------------------

/// Every failure the router surfaces to a dApp.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Malformed params or missing required field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The chain has no configured wallet proxy.
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    /// Unknown, expired, or wrong-origin session.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// Method denied by policy or by the user.
    #[error("insufficient permissions: {reason}")]
    InsufficientPermissions {
        /// Machine-readable reason, e.g. `user_denied` or `policy_denied`.
        reason: String,
    },

    /// The downstream wallet does not implement the method.
    #[error("method not supported by wallet: {0}")]
    MethodNotSupported(String),

    /// The transport to the backend failed.
    #[error("wallet not available: {0}")]
    WalletNotAvailable(String),

    /// At least one sub-call of a bulk operation failed. `results` is
    /// aligned index-for-index with the input calls.
    #[error("bulk call completed with failures")]
    PartialFailure {
        /// Per-slot outcomes, aligned with the input order.
        results: Vec<BulkEntry>,
    },

    /// A call or approval exceeded its deadline.
    #[error("request timed out: {0}")]
    RequestTimeout(String),

    /// Anything not classified above. Downstream detail, when present,
    /// rides along in `cause`.
    #[error("unknown error: {message}")]
    Unknown {
        /// Human-readable message.
        message: String,
        /// The original downstream error, if this wraps one.
        cause: Option<Value>,
    },
}

impl RouterError {
    /// The stable string kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::InvalidRequest(_) => "InvalidRequest",
            RouterError::UnknownChain(_) => "UnknownChain",
            RouterError::InvalidSession(_) => "InvalidSession",
            RouterError::InsufficientPermissions { .. } => "InsufficientPermissions",
            RouterError::MethodNotSupported(_) => "MethodNotSupported",
            RouterError::WalletNotAvailable(_) => "WalletNotAvailable",
            RouterError::PartialFailure { .. } => "PartialFailure",
            RouterError::RequestTimeout(_) => "RequestTimeout",
            RouterError::Unknown { .. } => "UnknownError",
        }
    }

    /// The stable numeric wire code for this error.
    pub fn code(&self) -> i64 {
        match self {
            RouterError::InvalidRequest(_) => codes::INVALID_REQUEST,
            RouterError::UnknownChain(_) => codes::UNKNOWN_CHAIN,
            RouterError::InvalidSession(_) => codes::INVALID_SESSION,
            RouterError::InsufficientPermissions { .. } => codes::INSUFFICIENT_PERMISSIONS,
            RouterError::MethodNotSupported(_) => codes::METHOD_NOT_SUPPORTED,
            RouterError::WalletNotAvailable(_) => codes::WALLET_NOT_AVAILABLE,
            RouterError::PartialFailure { .. } => codes::PARTIAL_FAILURE,
            RouterError::RequestTimeout(_) => codes::REQUEST_TIMEOUT,
            RouterError::Unknown { .. } => codes::UNKNOWN_ERROR,
        }
    }

    /// Structured data attached to the wire error, if any.
    fn data(&self) -> Option<Value> {
        match self {
            RouterError::UnknownChain(chain) => Some(json!({ "chain_id": chain })),
            RouterError::InsufficientPermissions { reason } => {
                Some(json!({ "reason": reason }))
            }
            RouterError::PartialFailure { results } => Some(json!({ "results": results })),
            RouterError::Unknown { cause: Some(c), .. } => Some(json!({ "cause": c })),
            _ => None,
        }
    }

    /// Convert to the JSON-RPC error object this becomes on the wire. The
    /// kind string is always present under `data.kind`.
    pub fn to_error_object(&self) -> ErrorObject {
        let mut data = self.data().unwrap_or_else(|| json!({}));
        if let Some(obj) = data.as_object_mut() {
            obj.insert("kind".to_string(), json!(self.kind()));
        }
        ErrorObject::with_data(self.code(), self.to_string(), data)
    }

    /// Reconstruct a `RouterError` from a wire error object. Codes outside
    /// the router taxonomy land in [`RouterError::Unknown`] with the
    /// original object preserved as the cause.
    pub fn from_error_object(err: &ErrorObject) -> Self {
        let data = err.data.as_ref();
        let field = |key: &str| {
            data.and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match err.code {
            codes::INVALID_REQUEST => RouterError::InvalidRequest(err.message.clone()),
            codes::UNKNOWN_CHAIN => {
                RouterError::UnknownChain(field("chain_id").unwrap_or_else(|| err.message.clone()))
            }
            codes::INVALID_SESSION => RouterError::InvalidSession(err.message.clone()),
            codes::INSUFFICIENT_PERMISSIONS => RouterError::InsufficientPermissions {
                reason: field("reason").unwrap_or_else(|| "denied".to_string()),
            },
            codes::METHOD_NOT_SUPPORTED => RouterError::MethodNotSupported(err.message.clone()),
            codes::WALLET_NOT_AVAILABLE => RouterError::WalletNotAvailable(err.message.clone()),
            codes::PARTIAL_FAILURE => {
                let results = data
                    .and_then(|d| d.get("results"))
                    .cloned()
                    .and_then(|r| serde_json::from_value(r).ok())
                    .unwrap_or_default();
                RouterError::PartialFailure { results }
            }
            codes::REQUEST_TIMEOUT => RouterError::RequestTimeout(err.message.clone()),
            _ => RouterError::Unknown {
                message: err.message.clone(),
                cause: data
                    .and_then(|d| d.get("cause"))
                    .cloned()
                    .or_else(|| Some(json!({ "code": err.code, "message": err.message }))),
            },
        }
    }

    /// Classify an error returned by a downstream wallet. `MethodNotFound`
    /// maps to [`RouterError::MethodNotSupported`]; everything else is
    /// rewrapped with the original error preserved under `cause`.
    pub fn from_wallet_error(method: &str, err: ErrorObject) -> Self {
        if err.code == message::METHOD_NOT_FOUND {
            return RouterError::MethodNotSupported(method.to_string());
        }
        RouterError::Unknown {
            message: err.message.clone(),
            cause: Some(json!({
                "code": err.code,
                "message": err.message,
                "data": err.data,
            })),
        }
    }

    /// The bulk-slot form of this error.
    pub fn to_bulk_error(&self) -> BulkError {
        BulkError {
            code: self.kind().to_string(),
            message: self.to_string(),
            data: self.data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let all = [
            codes::INVALID_REQUEST,
            codes::UNKNOWN_CHAIN,
            codes::INVALID_SESSION,
            codes::INSUFFICIENT_PERMISSIONS,
            codes::METHOD_NOT_SUPPORTED,
            codes::WALLET_NOT_AVAILABLE,
            codes::PARTIAL_FAILURE,
            codes::REQUEST_TIMEOUT,
            codes::UNKNOWN_ERROR,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn wire_roundtrip_preserves_kind() {
        let errors = [
            RouterError::InvalidRequest("missing field".into()),
            RouterError::UnknownChain("eip155:9999".into()),
            RouterError::InvalidSession("expired".into()),
            RouterError::InsufficientPermissions {
                reason: "user_denied".into(),
            },
            RouterError::MethodNotSupported("eth_mine".into()),
            RouterError::WalletNotAvailable("transport closed".into()),
            RouterError::RequestTimeout("approval".into()),
        ];
        for err in errors {
            let obj = err.to_error_object();
            let back = RouterError::from_error_object(&obj);
            assert_eq!(back.kind(), err.kind());
            assert_eq!(back.code(), err.code());
        }
    }

    #[test]
    fn unknown_chain_carries_chain_id_in_data() {
        let err = RouterError::UnknownChain("eip155:9999".into());
        let obj = err.to_error_object();
        assert_eq!(obj.data.as_ref().unwrap()["chain_id"], "eip155:9999");
        assert_eq!(obj.data.as_ref().unwrap()["kind"], "UnknownChain");

        let back = RouterError::from_error_object(&obj);
        assert!(matches!(back, RouterError::UnknownChain(c) if c == "eip155:9999"));
    }

    #[test]
    fn user_denial_reason_survives_the_wire() {
        let err = RouterError::InsufficientPermissions {
            reason: "user_denied".into(),
        };
        let obj = err.to_error_object();
        let back = RouterError::from_error_object(&obj);
        assert!(
            matches!(back, RouterError::InsufficientPermissions { reason } if reason == "user_denied")
        );
    }

    #[test]
    fn wallet_method_not_found_becomes_method_not_supported() {
        let downstream = ErrorObject::method_not_found("eth_mine");
        let err = RouterError::from_wallet_error("eth_mine", downstream);
        assert!(matches!(err, RouterError::MethodNotSupported(m) if m == "eth_mine"));
    }

    #[test]
    fn other_wallet_errors_are_rewrapped_with_cause() {
        let downstream = ErrorObject::with_data(-32000, "execution reverted", json!({"gas": 21000}));
        let err = RouterError::from_wallet_error("eth_call", downstream);
        match &err {
            RouterError::Unknown { cause: Some(c), .. } => {
                assert_eq!(c["code"], -32000);
                assert_eq!(c["message"], "execution reverted");
                assert_eq!(c["data"]["gas"], 21000);
            }
            other => panic!("expected Unknown with cause, got {other:?}"),
        }
        // And the cause survives a wire roundtrip.
        let back = RouterError::from_error_object(&err.to_error_object());
        match back {
            RouterError::Unknown { cause: Some(c), .. } => assert_eq!(c["code"], -32000),
            other => panic!("expected Unknown with cause, got {other:?}"),
        }
    }

    #[test]
    fn partial_failure_results_roundtrip_aligned() {
        let results = vec![
            BulkEntry::Success(json!("0x1")),
            BulkEntry::Failure {
                error: BulkError {
                    code: "MethodNotSupported".into(),
                    message: "method not supported by wallet: nonexistent".into(),
                    data: None,
                },
            },
            BulkEntry::Success(json!("0x10")),
        ];
        let err = RouterError::PartialFailure {
            results: results.clone(),
        };
        let obj = err.to_error_object();
        assert_eq!(obj.code, codes::PARTIAL_FAILURE);

        let back = RouterError::from_error_object(&obj);
        match back {
            RouterError::PartialFailure { results: r } => {
                assert_eq!(r.len(), 3);
                assert_eq!(r, results);
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }

    #[test]
    fn bulk_entry_serial_shape() {
        let slot = BulkEntry::Failure {
            error: BulkError {
                code: "MethodNotSupported".into(),
                message: "nope".into(),
                data: None,
            },
        };
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["error"]["code"], "MethodNotSupported");

        let ok = BulkEntry::Success(json!(["0xabc"]));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!(["0xabc"]));
    }
}
