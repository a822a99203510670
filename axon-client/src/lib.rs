//! Session-oriented client for a stateful analytics engine
//!
//! This crate implements the client core on top of `axon-core`'s wire
//! types: a WebSocket transport with request correlation, a session state
//! machine with suspend/resume, an API cache holding one proxy per live
//! server-side handle, and interceptor chains around every request and
//! response.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axon_client::SessionBuilder;
//! use axon_core::Request;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> axon_core::Result<()> {
//!     let session = SessionBuilder::new("ws://localhost:4848/app/engineData").build();
//!     session.open().await?;
//!
//!     // The global proxy is installed at handle -1 on open
//!     let global = session.global().expect("session is open");
//!     let doc = global.call("OpenDoc", json!(["sales.qvf"])).await?;
//!     println!("doc: {doc}");
//!
//!     // Or send raw requests through the same pipeline
//!     let layout = session
//!         .send(Request::new("GetLayout", 1, json!([])))
//!         .await?;
//!     println!("layout: {layout}");
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Suspend and resume
//!
//! ```rust,no_run
//! # async fn example(session: &axon_client::Session) -> axon_core::Result<()> {
//! session.suspend().await?;
//! // ... the socket is gone, proxies survive ...
//! session.resume(false).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod events;
mod interceptor;
mod pending;
mod proxy;
mod rpc;
mod session;
mod socket;
mod suspend;

pub use config::SessionBuilder;
pub use events::{NotificationFn, NotificationRouter, SessionEvent};
pub use interceptor::{
    default_request_chain, default_response_chain, delta_interceptor, error_interceptor,
    extraction_interceptor, DeltaPatcher, JsonPatch, RequestInterceptor, ResponseInterceptor,
};
pub use pending::{PendingCall, RequestIdSlot};
pub use proxy::{DynamicProxyFactory, MethodSet, ObjectProxy, ProxyFactory};
pub use session::{OpenFuture, Session, SessionState};
pub use socket::{
    SocketCommand, SocketConnection, SocketEvent, SocketFactory, WsSocketFactory, NORMAL_CLOSE,
};
