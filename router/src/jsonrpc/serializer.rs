//! # Method Serializers
//!
//! Some wallet methods move values JSON cannot express directly — 256-bit
//! integers, binary blobs, domain objects with canonical string forms. A
//! [`MethodSerializer`] owns the translation between the caller's shape and
//! the wire shape for one method, per direction: `params` on the way out of
//! a caller (encoded) and into a handler (decoded), `result` the other way
//! around.
//!
//! Both directions are optional; a method with no registered serializer
//! passes values through untouched.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from a codec translation.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The caller-side value could not be turned into its wire form.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The wire value could not be turned back into its caller form.
    #[error("decode failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// A bidirectional translation over JSON values.
///
/// Implementations must satisfy `decode(encode(x)) == x` for every value
/// they accept.
pub trait ValueCodec: Send + Sync {
    /// Caller shape to wire shape.
    fn encode(&self, value: Value) -> Result<Value, CodecError>;

    /// Wire shape back to caller shape.
    fn decode(&self, value: Value) -> Result<Value, CodecError>;
}

/// A codec built from two closures. The common case for method-specific
/// translations that do not warrant a named type.
pub struct FnCodec {
    encode: Box<dyn Fn(Value) -> Result<Value, CodecError> + Send + Sync>,
    decode: Box<dyn Fn(Value) -> Result<Value, CodecError> + Send + Sync>,
}

impl FnCodec {
    /// Builds a codec from an encode and a decode closure.
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(Value) -> Result<Value, CodecError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }
}

impl ValueCodec for FnCodec {
    fn encode(&self, value: Value) -> Result<Value, CodecError> {
        (self.encode)(value)
    }

    fn decode(&self, value: Value) -> Result<Value, CodecError> {
        (self.decode)(value)
    }
}

// ---------------------------------------------------------------------------
// Method Serializer
// ---------------------------------------------------------------------------

/// Per-method serializer: optional codecs for each direction.
#[derive(Clone, Default)]
pub struct MethodSerializer {
    /// Translation for the params value.
    pub params: Option<Arc<dyn ValueCodec>>,
    /// Translation for the result value.
    pub result: Option<Arc<dyn ValueCodec>>,
}

impl MethodSerializer {
    /// A serializer covering both directions.
    pub fn new(params: Arc<dyn ValueCodec>, result: Arc<dyn ValueCodec>) -> Self {
        Self {
            params: Some(params),
            result: Some(result),
        }
    }

    /// A serializer that only translates params.
    pub fn params_only(codec: Arc<dyn ValueCodec>) -> Self {
        Self {
            params: Some(codec),
            result: None,
        }
    }

    /// A serializer that only translates results.
    pub fn result_only(codec: Arc<dyn ValueCodec>) -> Self {
        Self {
            params: None,
            result: Some(codec),
        }
    }

    /// Encode outbound params. Absent params skip the codec entirely.
    pub fn encode_params(&self, params: Option<Value>) -> Result<Option<Value>, CodecError> {
        match (&self.params, params) {
            (Some(codec), Some(value)) => codec.encode(value).map(Some),
            (_, params) => Ok(params),
        }
    }

    /// Decode inbound params.
    pub fn decode_params(&self, params: Option<Value>) -> Result<Option<Value>, CodecError> {
        match (&self.params, params) {
            (Some(codec), Some(value)) => codec.decode(value).map(Some),
            (_, params) => Ok(params),
        }
    }

    /// Encode an outbound result.
    pub fn encode_result(&self, result: Value) -> Result<Value, CodecError> {
        match &self.result {
            Some(codec) => codec.encode(result),
            None => Ok(result),
        }
    }

    /// Decode an inbound result.
    pub fn decode_result(&self, result: Value) -> Result<Value, CodecError> {
        match &self.result {
            Some(codec) => codec.decode(result),
            None => Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Codec that moves u64 amounts through the wire as decimal strings,
    /// the way chains with 256-bit balances have to.
    fn amount_codec() -> Arc<dyn ValueCodec> {
        Arc::new(FnCodec::new(
            |v| {
                v.as_u64()
                    .map(|n| json!(n.to_string()))
                    .ok_or_else(|| CodecError::Encode("expected integer amount".into()))
            },
            |v| {
                v.as_str()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|n| json!(n))
                    .ok_or_else(|| CodecError::Decode("expected decimal string".into()))
            },
        ))
    }

    #[test]
    fn roundtrip_is_identity() {
        let codec = amount_codec();
        for value in [json!(0), json!(1), json!(123_456_789_u64)] {
            let wire = codec.encode(value.clone()).unwrap();
            assert_eq!(codec.decode(wire).unwrap(), value);
        }
    }

    #[test]
    fn params_direction_only_touches_params() {
        let ser = MethodSerializer::params_only(amount_codec());
        let encoded = ser.encode_params(Some(json!(42))).unwrap();
        assert_eq!(encoded, Some(json!("42")));
        // Result passes through untouched.
        assert_eq!(ser.encode_result(json!(42)).unwrap(), json!(42));
    }

    #[test]
    fn absent_params_skip_the_codec() {
        let ser = MethodSerializer::params_only(amount_codec());
        assert_eq!(ser.encode_params(None).unwrap(), None);
        assert_eq!(ser.decode_params(None).unwrap(), None);
    }

    #[test]
    fn default_serializer_is_passthrough() {
        let ser = MethodSerializer::default();
        assert_eq!(
            ser.encode_params(Some(json!({"a": 1}))).unwrap(),
            Some(json!({"a": 1}))
        );
        assert_eq!(ser.decode_result(json!("x")).unwrap(), json!("x"));
    }

    #[test]
    fn encode_errors_surface() {
        let ser = MethodSerializer::params_only(amount_codec());
        assert!(ser.encode_params(Some(json!("not a number"))).is_err());
    }
}
