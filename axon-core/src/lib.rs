//! Core wire types and codec for the axon engine protocol
//!
//! This crate provides the foundation the transport and session layers
//! build on:
//!
//! - **Types**: request/response/notification frames, handles, the
//!   side-band `change`/`close` lists
//! - **Codec**: serialization and deserialization of wire frames
//! - **Error handling**: the shared error taxonomy, including the
//!   engine's wire-format error body
//!
//! The crate is transport-agnostic; `axon-client` supplies the WebSocket
//! transport and the session state machine on top of it.

pub mod codec;
pub mod error;
pub mod types;

pub use error::{Error, Result, RpcErrorData};
pub use types::{EngineMessage, Handle, Notification, Request, Response, GLOBAL_HANDLE};
