//! Error types for axon
//!
//! Two layers of errors exist:
//!
//! - **Error**: the application-level taxonomy used throughout the crates
//!   (uses thiserror, cloneable so bulk rejection can fan one error out to
//!   many waiters)
//! - **RpcErrorData**: the wire-format error body carried inside a
//!   response frame, forwarded verbatim with its `code`, `message` and
//!   `parameter` fields
//!
//! # Propagation policy
//!
//! Transport and state errors reject the immediate caller. Engine errors
//! (`RpcErrorData`) travel through the response interceptor chain, which
//! converts them into `Error::Rpc`. Notification handlers never propagate
//! errors into the read loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the axon crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error for session and transport operations.
///
/// The state errors carry fixed, distinguishable messages: a request
/// rejected because the session suspended reads "Session suspended", one
/// rejected at teardown reads "Session closed". Callers match on the
/// variant rather than the text.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Socket failed to open, closed unexpectedly, or failed a write
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed frame or a frame that violates the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Error body returned by the engine, forwarded verbatim
    #[error("engine error: {0}")]
    Rpc(#[from] RpcErrorData),

    /// Operation attempted on a closed session
    #[error("Session closed")]
    Closed,

    /// Operation attempted while the session is suspended
    #[error("Session suspended")]
    Suspended,

    /// Conversion between Rust types and JSON failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An object could not be recovered during resume
    #[error("object could not be reattached: {0}")]
    Reattach(String),
}

/// Wire-format error body as the engine sends it.
///
/// Appears in the `error` field of a response frame. `code` and `message`
/// are always present; `parameter` names the offending argument when the
/// engine knows it.
///
/// # Examples
///
/// ```rust
/// use axon_core::RpcErrorData;
///
/// let err = RpcErrorData::new(2, "Invalid parameters").with_parameter("qWidth");
/// assert_eq!(err.code, 2);
/// assert_eq!(err.parameter.as_deref(), Some("qWidth"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorData {
    /// Numeric error code assigned by the engine
    pub code: i64,
    /// Human-readable error message
    pub message: String,
    /// Offending parameter, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl RpcErrorData {
    /// Create an error body with code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            parameter: None,
        }
    }

    /// Attach the offending parameter name.
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }
}

impl std::fmt::Display for RpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.parameter {
            Some(p) => write!(f, "[{}] {} ({})", self.code, self.message, p),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for RpcErrorData {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_messages() {
        assert_eq!(Error::Closed.to_string(), "Session closed");
        assert_eq!(Error::Suspended.to_string(), "Session suspended");
    }

    #[test]
    fn test_rpc_error_carried_verbatim() {
        let data = RpcErrorData::new(2, "m").with_parameter("p");
        let err = Error::from(data.clone());

        match err {
            Error::Rpc(inner) => {
                assert_eq!(inner.code, 2);
                assert_eq!(inner.message, "m");
                assert_eq!(inner.parameter.as_deref(), Some("p"));
            }
            other => panic!("expected Rpc error, got {:?}", other),
        }
        assert_eq!(data.to_string(), "[2] m (p)");
    }

    #[test]
    fn test_rpc_error_serialization_round_trip() {
        let json = r#"{"code":1003,"message":"Object not found","parameter":"qId"}"#;
        let data: RpcErrorData = serde_json::from_str(json).unwrap();
        assert_eq!(data.code, 1003);

        let encoded = serde_json::to_string(&data).unwrap();
        let back: RpcErrorData = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_rpc_error_parameter_optional() {
        let data: RpcErrorData =
            serde_json::from_str(r#"{"code":-1,"message":"internal"}"#).unwrap();
        assert!(data.parameter.is_none());

        let encoded = serde_json::to_string(&data).unwrap();
        assert!(!encoded.contains("parameter"));
    }

    #[test]
    fn test_error_clone_for_bulk_rejection() {
        let err = Error::Transport("connection reset".to_string());
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
