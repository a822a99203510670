//! Session configuration and builder
//!
//! Everything about a session is decided up front: endpoint, socket and
//! proxy factories, the global delta flag, close behavior and the
//! interceptor chains. The builder provides defaults for all of it, so the
//! common case is `SessionBuilder::new(url).build()` followed by
//! `session.open()`.

use crate::interceptor::{
    default_request_chain, default_response_chain, DeltaPatcher, JsonPatch, RequestInterceptor,
    ResponseInterceptor,
};
use crate::proxy::{DynamicProxyFactory, ProxyFactory};
use crate::session::Session;
use crate::socket::{SocketFactory, WsSocketFactory};
use std::sync::Arc;

pub(crate) struct SessionConfig {
    pub(crate) url: String,
    pub(crate) delta: bool,
    pub(crate) suspend_on_close: bool,
    pub(crate) socket_factory: Arc<dyn SocketFactory>,
    pub(crate) proxy_factory: Arc<dyn ProxyFactory>,
    pub(crate) request_interceptors: Vec<RequestInterceptor>,
    pub(crate) response_interceptors: Vec<ResponseInterceptor>,
}

/// Fluent configuration for a [`Session`].
///
/// # Examples
///
/// ```rust,no_run
/// use axon_client::SessionBuilder;
///
/// # async fn example() -> axon_core::Result<()> {
/// let session = SessionBuilder::new("ws://localhost:4848/app")
///     .suspend_on_close(true)
///     .build();
/// session.open().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    url: String,
    delta: bool,
    suspend_on_close: bool,
    socket_factory: Arc<dyn SocketFactory>,
    proxy_factory: Arc<dyn ProxyFactory>,
    patcher: Arc<dyn DeltaPatcher>,
    request_interceptors: Option<Vec<RequestInterceptor>>,
    response_interceptors: Option<Vec<ResponseInterceptor>>,
}

impl SessionBuilder {
    /// Start configuring a session against the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            delta: true,
            suspend_on_close: false,
            socket_factory: Arc::new(WsSocketFactory),
            proxy_factory: Arc::new(DynamicProxyFactory),
            patcher: Arc::new(JsonPatch),
            request_interceptors: None,
            response_interceptors: None,
        }
    }

    /// Override the socket factory (the `createSocket` seam).
    pub fn socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.socket_factory = factory;
        self
    }

    /// Override the proxy factory used to generate method surfaces.
    pub fn proxy_factory(mut self, factory: Arc<dyn ProxyFactory>) -> Self {
        self.proxy_factory = factory;
        self
    }

    /// Global delta-encoding flag (default `true`). A per-request
    /// `delta: false` always wins over this.
    pub fn delta(mut self, enabled: bool) -> Self {
        self.delta = enabled;
        self
    }

    /// Treat an unsolicited close as a suspend instead of a termination
    /// (default `false`). A user-initiated close (code 1000) always
    /// terminates.
    pub fn suspend_on_close(mut self, enabled: bool) -> Self {
        self.suspend_on_close = enabled;
        self
    }

    /// Override the delta patcher used by the default response chain.
    pub fn patcher(mut self, patcher: Arc<dyn DeltaPatcher>) -> Self {
        self.patcher = patcher;
        self
    }

    /// Replace the request interceptor chain.
    pub fn request_interceptors(mut self, chain: Vec<RequestInterceptor>) -> Self {
        self.request_interceptors = Some(chain);
        self
    }

    /// Replace the response interceptor chain. The default chain applies
    /// deltas, maps engine errors to exceptions and extracts the result.
    pub fn response_interceptors(mut self, chain: Vec<ResponseInterceptor>) -> Self {
        self.response_interceptors = Some(chain);
        self
    }

    /// Build the session. No connection is made until
    /// [`Session::open`](crate::Session::open) is awaited.
    ///
    /// Must run inside a tokio runtime: the session spawns its event pump
    /// on creation.
    pub fn build(self) -> Session {
        let request_interceptors = self
            .request_interceptors
            .unwrap_or_else(default_request_chain);
        let response_interceptors = self
            .response_interceptors
            .unwrap_or_else(|| default_response_chain(Arc::clone(&self.patcher)));

        Session::from_config(SessionConfig {
            url: self.url,
            delta: self.delta,
            suspend_on_close: self.suspend_on_close,
            socket_factory: self.socket_factory,
            proxy_factory: self.proxy_factory,
            request_interceptors,
            response_interceptors,
        })
    }
}
