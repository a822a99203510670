//! Session event fan-out
//!
//! Two complementary mechanisms, both fed by the session:
//!
//! - a [`broadcast`] channel of [`SessionEvent`] values — the typed
//!   pub/sub surface; lifecycle transitions, socket errors, notifications
//!   and per-handle change/close events all travel here, and any number of
//!   subscribers can observe them;
//! - a [`NotificationRouter`] for callers who prefer registering async
//!   callbacks for engine notifications, per method or wildcard.
//!
//! Handlers never feed errors back into the read loop; a handler is an
//! observer, not a participant in the protocol.

use axon_core::Handle;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Everything a session can tell the outside world.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session finished opening; the global proxy is available
    Opened,
    /// The session terminated with the given close code
    Closed { code: u16 },
    /// The transport was dropped while the logical state was retained
    Suspended,
    /// The transport was re-established; `closed` lists the handles lost
    /// during reconciliation
    Resumed { closed: Vec<Handle> },
    /// A transport-level error was observed
    SocketError(String),
    /// A standalone engine notification
    Notification { method: String, params: Value },
    /// Server-side state of the handle changed
    HandleChanged(Handle),
    /// The handle was released by the engine
    HandleClosed(Handle),
}

/// Async callback for engine notifications. Receives the method name and
/// the params payload.
pub type NotificationFn =
    Arc<dyn Fn(String, Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Registry of notification callbacks: per-method plus wildcard.
#[derive(Clone)]
pub struct NotificationRouter {
    by_method: Arc<Mutex<HashMap<String, Vec<NotificationFn>>>>,
    wildcard: Arc<Mutex<Vec<NotificationFn>>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self {
            by_method: Arc::new(Mutex::new(HashMap::new())),
            wildcard: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a callback for one notification method.
    pub async fn register<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: NotificationFn = Arc::new(move |_method, params| Box::pin(handler(params)));
        self.by_method
            .lock()
            .await
            .entry(method.into())
            .or_default()
            .push(handler);
    }

    /// Register a wildcard callback receiving every notification along
    /// with its method name.
    pub async fn register_wildcard<F, Fut>(&self, handler: F)
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: NotificationFn = Arc::new(move |method, params| Box::pin(handler(method, params)));
        self.wildcard.lock().await.push(handler);
    }

    /// Dispatch one notification to the matching and wildcard callbacks.
    ///
    /// Handlers are cloned out of the lock before awaiting so a slow
    /// handler cannot block registration.
    pub async fn dispatch(&self, method: &str, params: Value) {
        let targeted: Vec<NotificationFn> = {
            let map = self.by_method.lock().await;
            map.get(method).cloned().unwrap_or_default()
        };
        let wildcard: Vec<NotificationFn> = self.wildcard.lock().await.clone();

        for handler in targeted {
            handler(method.to_string(), params.clone()).await;
        }
        for handler in wildcard {
            handler(method.to_string(), params.clone()).await;
        }
    }

    /// True if at least one callback is registered for the method.
    pub async fn has_handler(&self, method: &str) -> bool {
        self.by_method.lock().await.contains_key(method)
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the session's broadcast channel.
pub(crate) fn channel() -> broadcast::Sender<SessionEvent> {
    let (tx, _) = broadcast::channel(256);
    tx
}

/// Emit ignoring the no-subscribers case.
pub(crate) fn emit(tx: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    let _ = tx.send(event);
}
