//! Wire-level message types for the engine protocol
//!
//! The engine speaks JSON-RPC 2.0 over a duplex text channel, extended with
//! a few protocol fields of its own:
//!
//! - every request addresses a server-side object through an integer
//!   **handle** (`-1` is the global handle, present for the whole session);
//! - responses may piggyback side-band `change`/`close` handle lists that
//!   describe object state transitions observed while the request was
//!   processed;
//! - results may be delta-encoded (`delta: true`), in which case the
//!   `result` field carries patches rather than a full payload.
//!
//! # Message Types
//!
//! Three frame shapes travel on the wire:
//!
//! 1. **Request**: a method call against a handle, correlated by `id`
//! 2. **Response**: the outcome of exactly one request, matched by `id`
//! 3. **Notification**: a server-initiated event without an `id`
//!
//! # Request IDs
//!
//! Ids are unsigned integers assigned by the RPC layer at enqueue time,
//! strictly increasing from 1 within a single socket connection. A request
//! that has not been enqueued yet carries no id, which is why the field is
//! optional here.

use crate::error::RpcErrorData;
use serde::{Deserialize, Serialize};

/// Integer name of a server-side object.
///
/// Positive handles are issued by the engine and live until the engine
/// reports a `close` for them or the session terminates. `-1` is the
/// [`GLOBAL_HANDLE`].
pub type Handle = i32;

/// The always-present root handle from which all other objects are obtained.
pub const GLOBAL_HANDLE: Handle = -1;

fn protocol_version() -> String {
    "2.0".to_string()
}

fn global_handle() -> Handle {
    GLOBAL_HANDLE
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

/// A method call against a server-side object.
///
/// Only the enumerated fields are ever forwarded to the engine. Because
/// deserialization ignores unknown keys, round-tripping an arbitrary JSON
/// object through this type is exactly the allow-list strip the protocol
/// requires: anything outside `{method, handle, params, delta, cont,
/// return_empty, id, jsonrpc}` is dropped.
///
/// # Examples
///
/// ```rust
/// use axon_core::Request;
/// use serde_json::json;
///
/// let req = Request::new("GetLayout", 3, json!([]));
/// assert_eq!(req.handle, 3);
/// assert_eq!(req.jsonrpc, "2.0");
/// assert!(req.id.is_none());
///
/// // Unknown keys vanish on the way in
/// let stripped = Request::from_value(json!({
///     "method": "GetLayout",
///     "handle": 3,
///     "params": [],
///     "xyz": "dropped",
/// })).unwrap();
/// assert_eq!(stripped.handle, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Name of the remote method to invoke
    pub method: String,
    /// Target object handle; defaults to the global handle
    #[serde(default = "global_handle")]
    pub handle: Handle,
    /// Positional or named parameters; defaults to an empty array
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
    /// Delta-encoding flag. `None` means "use the session default";
    /// an explicit `false` is preserved on the wire and never overridden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<bool>,
    /// Continuation token for paged operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cont: Option<serde_json::Value>,
    /// Ask the engine to omit the result payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_empty: Option<bool>,
    /// Correlation id, assigned by the RPC layer at enqueue time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// JSON-RPC version, always "2.0"
    #[serde(default = "protocol_version")]
    pub jsonrpc: String,
}

impl Request {
    /// Create a request against the given handle.
    pub fn new(method: impl Into<String>, handle: Handle, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            handle,
            params,
            delta: None,
            cont: None,
            return_empty: None,
            id: None,
            jsonrpc: protocol_version(),
        }
    }

    /// Create a request against the global handle.
    pub fn global(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self::new(method, GLOBAL_HANDLE, params)
    }

    /// Set the delta flag explicitly. An explicit `false` survives the
    /// session-level merge of protocol options.
    pub fn with_delta(mut self, delta: bool) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Build a request from a loose JSON object, dropping every key that is
    /// not part of the protocol.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        serde_json::from_value(value).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

/// The outcome of exactly one request, correlated by `id`.
///
/// Exactly one of `result` or `error` is present on a well-formed frame.
/// The `change` and `close` lists are side-band notifications piggybacked
/// on the response: handles whose server-side state changed (or which were
/// released) while the request was processed. They must be observable
/// before the caller sees the response itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id from the originating request
    pub id: u64,
    /// Result payload (present only on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error body (present only on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorData>,
    /// Handles whose state changed, piggybacked on this response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change: Vec<Handle>,
    /// Handles released by the engine, piggybacked on this response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub close: Vec<Handle>,
    /// Whether `result` carries a delta patch instead of a full payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<bool>,
    /// JSON-RPC version, always "2.0"
    #[serde(default = "protocol_version")]
    pub jsonrpc: String,
}

impl Response {
    /// Create a successful response.
    pub fn success(result: serde_json::Value, id: u64) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
            change: Vec::new(),
            close: Vec::new(),
            delta: None,
            jsonrpc: protocol_version(),
        }
    }

    /// Create an error response.
    pub fn error(error: RpcErrorData, id: u64) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
            change: Vec::new(),
            close: Vec::new(),
            delta: None,
            jsonrpc: protocol_version(),
        }
    }

    /// True if `result` is present.
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// True if `error` is present.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A server-initiated event. The absence of an `id` is what distinguishes
/// a notification from a response on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Event name
    pub method: String,
    /// Event payload
    #[serde(default)]
    pub params: serde_json::Value,
    /// JSON-RPC version, always "2.0"
    #[serde(default = "protocol_version")]
    pub jsonrpc: String,
}

impl Notification {
    /// Create a notification.
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            params,
            jsonrpc: protocol_version(),
        }
    }
}

/// Any frame the engine can send to the client.
///
/// Incoming text is parsed through this enum; `#[serde(untagged)]` picks
/// the variant by shape. A frame with an `id` is a [`Response`], a frame
/// with a `method` but no `id` is a [`Notification`].
///
/// # Examples
///
/// ```rust
/// use axon_core::{codec, EngineMessage};
///
/// let msg = codec::decode(r#"{"id":1,"result":{},"jsonrpc":"2.0"}"#).unwrap();
/// assert!(matches!(msg, EngineMessage::Response(_)));
///
/// let msg = codec::decode(r#"{"method":"OnProgress","params":{}}"#).unwrap();
/// assert!(matches!(msg, EngineMessage::Notification(_)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineMessage {
    /// A response to an outstanding request
    Response(Response),
    /// A standalone server event
    Notification(Notification),
}

impl EngineMessage {
    /// True for the `Response` variant.
    pub fn is_response(&self) -> bool {
        matches!(self, EngineMessage::Response(_))
    }

    /// True for the `Notification` variant.
    pub fn is_notification(&self) -> bool {
        matches!(self, EngineMessage::Notification(_))
    }
}
