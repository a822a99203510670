//! The session state machine
//!
//! A [`Session`] owns the RPC layer, the API cache and the event fan-out,
//! and drives the lifecycle
//! `created → opening → opened → (suspended ⇄ resumed)* → closed`.
//!
//! The send pipeline, in order: state gate, protocol-option merge (the
//! session-wide delta default, never overriding an explicit `false`),
//! request interceptor chain, enqueue on the RPC layer (which assigns the
//! id), side-band routing of the response's `change`/`close` lists, and
//! finally the response interceptor chain. Side-band events are emitted
//! **before** the caller's future resolves, so an observer always sees
//! `HandleChanged`/`HandleClosed` ahead of any follow-up call made from
//! the continuation.
//!
//! Sessions are cheap to clone; all clones share one connection and one
//! cache.

use crate::cache::{ApiCache, CacheEntry};
use crate::config::{SessionBuilder, SessionConfig};
use crate::events::{self, NotificationRouter, SessionEvent};
use crate::pending::{PendingCall, RequestIdSlot};
use crate::proxy::{MethodSet, ObjectProxy};
use crate::rpc::{Rpc, RpcEvent};
use crate::socket::NORMAL_CLOSE;
use axon_core::{Error, Handle, Request, Response, Result, GLOBAL_HANDLE};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, mpsc};

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built, never opened
    Created,
    /// `open()` in flight
    Opening,
    /// Connected and usable
    Opened,
    /// `suspend()` tearing the socket down
    Suspending,
    /// Socket gone, logical state retained
    Suspended,
    /// `resume()` reconciling handles
    Resuming,
    /// `close()` in flight
    Closing,
    /// Terminated
    Closed,
}

/// The future returned by [`Session::open`]. Cloneable; a second `open()`
/// while one is in flight returns the same shared future.
pub type OpenFuture = Shared<BoxFuture<'static, Result<()>>>;

pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) rpc: Rpc,
    pub(crate) cache: Mutex<ApiCache>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) notifications: NotificationRouter,
    method_sets: Mutex<HashMap<String, Arc<MethodSet>>>,
    open_future: Mutex<Option<OpenFuture>>,
}

/// Handle to one engine session. Clones share all state.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl Session {
    /// Start configuring a new session.
    pub fn builder(url: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(url)
    }

    pub(crate) fn from_config(config: SessionConfig) -> Session {
        let events_tx = events::channel();
        let (rpc_tx, rpc_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            config,
            state: Mutex::new(SessionState::Created),
            rpc: Rpc::new(rpc_tx),
            cache: Mutex::new(ApiCache::new(events_tx.clone())),
            events: events_tx,
            notifications: NotificationRouter::new(),
            method_sets: Mutex::new(HashMap::new()),
            open_future: Mutex::new(None),
        });

        tokio::spawn(event_pump(Arc::downgrade(&inner), rpc_rx));
        Session { inner }
    }

    /// Open the session: connect the socket and install the global proxy
    /// at handle `-1`.
    ///
    /// Idempotent: while an open is in flight (or already completed and
    /// the session has not been closed or suspended since), every call
    /// returns the same shared future.
    ///
    /// A suspended session cannot be reopened this way: its cached
    /// handles must be reconciled against the new connection, so the
    /// call rejects with [`Error::Suspended`] — use
    /// [`resume`](Session::resume) instead.
    pub fn open(&self) -> OpenFuture {
        let inner = Arc::clone(&self.inner);
        let mut guard = inner.open_future.lock().unwrap();
        if let Some(pending) = guard.as_ref() {
            return pending.clone();
        }

        {
            let mut state = inner.state.lock().unwrap();
            match *state {
                SessionState::Created | SessionState::Closed => {
                    *state = SessionState::Opening;
                }
                // Already connected (e.g. right after a resume): nothing
                // to dial, the open is trivially satisfied.
                SessionState::Opened => {
                    return futures::future::ready(Ok(())).boxed().shared();
                }
                SessionState::Suspending | SessionState::Suspended | SessionState::Resuming => {
                    return futures::future::ready(Err(Error::Suspended)).boxed().shared();
                }
                SessionState::Opening | SessionState::Closing => {
                    return futures::future::ready(Err(Error::Closed)).boxed().shared();
                }
            }
        }

        let task = Arc::clone(&inner);
        let fut: OpenFuture = async move {
            tracing::info!(url = %task.config.url, "opening session");
            match task
                .rpc
                .open(task.config.socket_factory.as_ref(), &task.config.url)
                .await
            {
                Ok(()) => {
                    task.ensure_global_proxy();
                    *task.state.lock().unwrap() = SessionState::Opened;
                    events::emit(&task.events, SessionEvent::Opened);
                    tracing::info!("session opened");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to open session");
                    *task.state.lock().unwrap() = SessionState::Closed;
                    task.open_future.lock().unwrap().take();
                    Err(e)
                }
            }
        }
        .boxed()
        .shared();

        *guard = Some(fut.clone());
        fut
    }

    /// Send a request through the full pipeline.
    ///
    /// The returned [`PendingCall`] resolves with the extracted result
    /// value; its id slot is populated as soon as the request reaches the
    /// wire.
    pub fn send(&self, request: Request) -> PendingCall<Value> {
        SessionInner::send_request(&self.inner, request)
    }

    /// Send a loose JSON object. Keys outside the protocol allow-list are
    /// stripped before anything reaches the wire.
    pub fn send_json(&self, value: Value) -> PendingCall<Value> {
        match Request::from_value(value) {
            Ok(request) => self.send(request),
            Err(e) => PendingCall::ready_err(e),
        }
    }

    /// Close the session deliberately. Rejects everything outstanding,
    /// emits `Closed` and drops every cache entry (with a `HandleClosed`
    /// per entry). Always terminates, regardless of `suspend_on_close`.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closing;
        }
        self.inner.rpc.close(NORMAL_CLOSE, "closed by user");
        *self.inner.state.lock().unwrap() = SessionState::Closed;
        self.inner.teardown(NORMAL_CLOSE);
        tracing::info!("session closed");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().unwrap()
    }

    /// Subscribe to the session's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Register an async callback for one notification method.
    pub async fn on_notification<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.notifications.register(method, handler).await;
    }

    /// Register an async callback for every notification; receives the
    /// method name first.
    pub async fn on_any_notification<F, Fut>(&self, handler: F)
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.notifications.register_wildcard(handler).await;
    }

    /// The global proxy, once the session has opened.
    pub fn global(&self) -> Option<ObjectProxy> {
        self.api(GLOBAL_HANDLE)
    }

    /// The proxy registered for a handle, if the handle is live.
    pub fn api(&self, handle: Handle) -> Option<ObjectProxy> {
        self.inner.cache.lock().unwrap().get_api(handle)
    }

    /// Every live proxy, in insertion order.
    pub fn apis(&self) -> Vec<ObjectProxy> {
        self.inner.cache.lock().unwrap().apis()
    }

    /// Obtain the proxy for a handle, creating (and caching) it if the
    /// handle is new. At most one proxy exists per live handle; repeated
    /// calls return the same instance.
    pub fn get_or_create_api(
        &self,
        handle: Handle,
        object_type: &str,
        object_id: &str,
        generic_type: Option<String>,
    ) -> ObjectProxy {
        self.inner
            .get_or_create_api(handle, object_type, object_id, generic_type)
    }

    /// Last full payload recorded for `(handle, method)` by the delta
    /// interceptor.
    pub fn get_patchee(&self, handle: Handle, method: &str) -> Option<Value> {
        self.inner.cache.lock().unwrap().get_patchee(handle, method)
    }

    /// Record the full payload for `(handle, method)`.
    pub fn set_patchee(&self, handle: Handle, method: &str, value: Value) {
        self.inner
            .cache
            .lock()
            .unwrap()
            .set_patchee(handle, method, value);
    }
}

impl SessionInner {
    pub(crate) fn send_request(self: &Arc<Self>, request: Request) -> PendingCall<Value> {
        let inner = Arc::clone(self);
        let slot = RequestIdSlot::new();
        let slot_in = slot.clone();

        let fut = async move {
            inner.check_sendable()?;

            let mut request = request;
            // Protocol-option merge: the session default applies only when
            // the caller left the field open. An explicit false wins.
            if request.delta.is_none() && inner.config.delta {
                request.delta = Some(true);
            }

            let session = Session {
                inner: Arc::clone(&inner),
            };
            for interceptor in &inner.config.request_interceptors {
                request = interceptor(session.clone(), request).await?;
            }

            // The state may have moved while the interceptors ran.
            inner.check_sendable()?;
            let rx = inner.rpc.submit(&mut request)?;
            if let Some(id) = request.id {
                slot_in.set(id);
            }
            let request = Arc::new(request);

            let response = match rx.await {
                Ok(settled) => settled?,
                Err(_) => return Err(Error::Closed),
            };

            // Side-band first: observers see handle events before the
            // caller's future resolves.
            inner.route_side_band(&response);

            let mut response = response;
            for interceptor in &inner.config.response_interceptors {
                response = interceptor(session.clone(), Arc::clone(&request), response).await?;
            }

            Ok(response.result.unwrap_or(Value::Null))
        };

        // Eager dispatch: the request is on its way whether or not the
        // caller polls yet. The returned future only observes the
        // settlement.
        let task = tokio::spawn(fut);
        PendingCall::new(
            slot,
            async move {
                task.await
                    .map_err(|_| Error::Transport("send task failed".to_string()))?
            }
            .boxed(),
        )
    }

    fn check_sendable(&self) -> Result<()> {
        match *self.state.lock().unwrap() {
            SessionState::Opened => Ok(()),
            SessionState::Suspending | SessionState::Suspended | SessionState::Resuming => {
                Err(Error::Suspended)
            }
            _ => Err(Error::Closed),
        }
    }

    /// Route the piggybacked `change`/`close` lists. Change first, close
    /// second: close is terminal for a handle.
    fn route_side_band(&self, response: &Response) {
        if !response.change.is_empty() {
            let cache = self.cache.lock().unwrap();
            for handle in &response.change {
                cache.notify_changed(*handle);
            }
        }
        if !response.close.is_empty() {
            let mut cache = self.cache.lock().unwrap();
            for handle in &response.close {
                cache.remove(*handle);
            }
        }
    }

    pub(crate) fn get_or_create_api(
        self: &Arc<Self>,
        handle: Handle,
        object_type: &str,
        object_id: &str,
        generic_type: Option<String>,
    ) -> ObjectProxy {
        if let Some(existing) = self.cache.lock().unwrap().get_api(handle) {
            return existing;
        }

        let methods = self.method_set_for(object_type);
        let proxy = methods.create(
            Arc::downgrade(self),
            handle,
            object_id.to_string(),
            self.config.delta,
            generic_type.clone(),
        );
        self.cache.lock().unwrap().add(CacheEntry::new(
            handle,
            object_id,
            generic_type,
            proxy.clone(),
        ));
        proxy
    }

    /// One method set per type, generated once and reused across handles.
    fn method_set_for(&self, object_type: &str) -> Arc<MethodSet> {
        let mut sets = self.method_sets.lock().unwrap();
        Arc::clone(
            sets.entry(object_type.to_string())
                .or_insert_with(|| Arc::new(self.config.proxy_factory.generate(object_type))),
        )
    }

    fn ensure_global_proxy(self: &Arc<Self>) {
        self.get_or_create_api(GLOBAL_HANDLE, "Global", "Global", None);
    }

    pub(crate) fn clear_open_future(&self) {
        self.open_future.lock().unwrap().take();
    }

    /// Terminal teardown: emit `Closed`, then drop the cache with a
    /// `HandleClosed` per entry. Outstanding requests were already
    /// rejected by the RPC layer.
    pub(crate) fn teardown(&self, code: u16) {
        self.clear_open_future();
        events::emit(&self.events, SessionEvent::Closed { code });
        self.cache.lock().unwrap().clear_emitting();
    }

    fn in_suspend_family(&self) -> bool {
        matches!(
            *self.state.lock().unwrap(),
            SessionState::Suspending | SessionState::Suspended | SessionState::Resuming
        )
    }

    async fn handle_rpc_event(self: &Arc<Self>, event: RpcEvent) {
        match event {
            RpcEvent::Notification(notification) => {
                if self.in_suspend_family() {
                    return;
                }
                tracing::debug!(method = %notification.method, "notification received");
                events::emit(
                    &self.events,
                    SessionEvent::Notification {
                        method: notification.method.clone(),
                        params: notification.params.clone(),
                    },
                );
                self.notifications
                    .dispatch(&notification.method, notification.params)
                    .await;
            }
            RpcEvent::SocketError(error) => {
                if self.in_suspend_family() {
                    return;
                }
                events::emit(&self.events, SessionEvent::SocketError(error));
            }
            RpcEvent::Closed { code } => self.handle_unsolicited_close(code),
        }
    }

    /// The socket went away without a `close()`/`suspend()` call on our
    /// side. A non-user close code with `suspend_on_close` set parks the
    /// session instead of killing it.
    fn handle_unsolicited_close(self: &Arc<Self>, code: u16) {
        let mut state = self.state.lock().unwrap();
        match *state {
            SessionState::Opened | SessionState::Opening => {
                if self.config.suspend_on_close && code != NORMAL_CLOSE {
                    tracing::warn!(code, "connection lost, suspending session");
                    *state = SessionState::Suspended;
                    drop(state);
                    self.clear_open_future();
                    events::emit(&self.events, SessionEvent::Suspended);
                } else {
                    tracing::warn!(code, "connection lost, closing session");
                    *state = SessionState::Closed;
                    drop(state);
                    self.teardown(code);
                }
            }
            // Deliberate close/suspend or an already-dead session: the
            // transition was handled where it was initiated.
            _ => {}
        }
    }
}

async fn event_pump(weak: Weak<SessionInner>, mut events: mpsc::UnboundedReceiver<RpcEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        inner.handle_rpc_event(event).await;
    }
}
