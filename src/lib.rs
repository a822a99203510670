//! axon — session-oriented JSON-RPC over WebSocket
//!
//! Convenience crate re-exporting the axon sub-crates. Use this if you
//! want a single dependency for talking to the engine.
//!
//! # Architecture
//!
//! - **axon-core**: wire types, codec, error taxonomy
//! - **axon-client**: socket transport, RPC correlation, session state
//!   machine, API cache, proxies, suspend/resume
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axon::Session;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> axon::core::Result<()> {
//!     let session = Session::builder("ws://localhost:4848/app/engineData").build();
//!     session.open().await?;
//!
//!     let global = session.global().expect("session is open");
//!     let result = global.call("EngineVersion", json!([])).await?;
//!     println!("engine: {result}");
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub use axon_client as client;
pub use axon_core as core;

pub use axon_client::{ObjectProxy, Session, SessionBuilder, SessionEvent, SessionState};
pub use axon_core::{Error, Handle, Request, Response, GLOBAL_HANDLE};
