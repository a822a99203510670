//! Encoding and decoding of wire frames
//!
//! Thin layer over serde_json that maps failures into the protocol error
//! taxonomy: an unparseable or shape-violating frame is an
//! [`Error::Protocol`], a type mismatch when the caller knows the expected
//! shape is an [`Error::Serialization`].
//!
//! # Examples
//!
//! ```rust
//! use axon_core::{codec, Request};
//! use serde_json::json;
//!
//! let req = Request::new("GetLayout", 1, json!([]));
//! let text = codec::encode(&req).unwrap();
//! assert!(text.contains("\"method\":\"GetLayout\""));
//!
//! let msg = codec::decode(r#"{"id":1,"result":{},"jsonrpc":"2.0"}"#).unwrap();
//! assert!(msg.is_response());
//! ```

use crate::error::{Error, Result};
use crate::types::EngineMessage;
use serde::{Deserialize, Serialize};

/// Encode any serializable frame to a JSON string.
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode an incoming text frame into an [`EngineMessage`].
///
/// The frame shape decides the variant: presence of `id` makes it a
/// response, a `method` without an `id` makes it a notification. Anything
/// else is a protocol error.
pub fn decode(data: &str) -> Result<EngineMessage> {
    serde_json::from_str(data).map_err(|e| Error::Protocol(format!("malformed frame: {e}")))
}

/// Decode a frame into a specific known type.
pub fn decode_as<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
}
