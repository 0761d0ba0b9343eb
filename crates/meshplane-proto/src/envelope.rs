//! Wire envelope types.
//!
//! Inbound frames are decoded into an [`Envelope`] *before* validation, so
//! the dispatcher can echo the caller's `id` even when the rest of the
//! envelope is garbage. Outbound frames are built from [`Response`], which
//! carries exactly one of `result`/`error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The only protocol version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Malformed frame (not parseable as JSON).
pub const PARSE_ERROR: i64 = -32700;
/// Envelope shape violation.
pub const INVALID_REQUEST: i64 = -32600;
/// Method name not present in the handler table.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Per-method parameter validation failed.
pub const INVALID_PARAMS: i64 = -32602;
/// Unexpected internal failure (e.g. a panicking handler).
pub const INTERNAL_ERROR: i64 = -32603;
/// A resolved handler reported a failure.
pub const SERVER_ERROR: i64 = -32000;

/// Decode failure for an inbound frame.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A decoded inbound frame, prior to any validation.
///
/// Fields are kept as raw [`Value`]s so that shape violations (non-string
/// method, wrong version literal) can still be reported against the
/// caller's `id`.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The `jsonrpc` field, if present.
    pub version: Option<Value>,
    /// The `method` field, if present.
    pub method: Option<Value>,
    /// The `params` field, if present.
    pub params: Option<Value>,
    /// The `id` field; `Null` when absent.
    pub id: Value,
}

impl Envelope {
    /// Decode a raw text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(value))
    }

    /// Extract envelope fields from an already-parsed value.
    ///
    /// A frame that is valid JSON but not an object (`"hi"`, `[1,2]`)
    /// yields an envelope with every field absent, which the dispatcher
    /// then rejects as an invalid request.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => Self {
                version: map.remove("jsonrpc"),
                method: map.remove("method"),
                params: map.remove("params"),
                id: map.remove("id").unwrap_or(Value::Null),
            },
            _ => Self {
                version: None,
                method: None,
                params: None,
                id: Value::Null,
            },
        }
    }

    /// The method name, if it is a non-empty string.
    pub fn method_str(&self) -> Option<&str> {
        match &self.method {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Whether the `jsonrpc` field equals the required `"2.0"` literal.
    pub fn version_ok(&self) -> bool {
        matches!(&self.version, Some(Value::String(s)) if s == JSONRPC_VERSION)
    }

    /// Notifications carry an absent or falsy `id` and get no response.
    pub fn is_notification(&self) -> bool {
        !id_is_truthy(&self.id)
    }
}

/// Truthiness of a request `id`, matching the loose semantics of the
/// protocol: `null`, `false`, `0` and `""` all mark a notification.
pub fn id_is_truthy(id: &Value) -> bool {
    match id {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A protocol error object carried inside a response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    /// One of the fixed protocol codes.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `-32700` — the frame was not parseable.
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// `-32600` — the envelope shape is invalid.
    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    /// `-32601` — no handler registered under this name.
    pub fn method_not_found(method: &str, service: &str) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            format!("Method '{method}' not found in service '{service}'"),
        )
    }

    /// `-32602` — per-method parameter validation failed.
    pub fn invalid_params() -> Self {
        Self::new(INVALID_PARAMS, "Invalid params")
    }

    /// `-32000` — the handler itself reported a failure.
    pub fn handler_failure(message: impl Into<String>) -> Self {
        Self::new(SERVER_ERROR, message)
    }

    /// `-32603` — something unexpected broke inside the dispatcher.
    pub fn internal() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }
}

/// An outbound response envelope. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Echo of the request `id`; `null` for unparseable frames.
    pub id: Value,
}

impl Response {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Build an error response.
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Serialize to a text frame.
    ///
    /// Serialization of a `Response` cannot fail for any value built by
    /// this crate; the fallback exists so the dispatcher is never left
    /// without a well-formed reply.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"jsonrpc":"2.0","error":{{"code":{INTERNAL_ERROR},"message":"Internal error"}},"id":null}}"#
            )
        })
    }
}
