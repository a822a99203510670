//! Generated object proxies
//!
//! Every server-side object is represented client-side by an
//! [`ObjectProxy`]: a cheap clone handle that dispatches method calls as
//! requests against the object's handle. The method surface comes from a
//! [`ProxyFactory`] — the schema-to-stubs function. Stub generation stays
//! dynamic: a method set is a mapping from names to the one dispatcher
//! that builds the request, not generated code.
//!
//! Ownership is deliberately one-directional: the cache owns the proxy
//! entries, a proxy holds only its handle plus a non-owning reference to
//! the session, and the session owns the cache. No retain cycle crosses an
//! ownership boundary.

use crate::pending::PendingCall;
use crate::session::SessionInner;
use axon_core::{Error, Handle, Request};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

/// The schema-to-stubs function, referenced through its interface.
///
/// `generate` is pure: same type in, same method set out. The session
/// caches the result per type and reuses it across handles.
pub trait ProxyFactory: Send + Sync {
    /// Produce the method surface for an object type.
    fn generate(&self, object_type: &str) -> MethodSet;
}

/// Method surface of one object type.
///
/// A set built from a discovered schema restricts dispatch to the listed
/// names; a [`dynamic`](MethodSet::dynamic) set lets every name through
/// (the engine itself rejects unknown methods).
#[derive(Debug, Clone)]
pub struct MethodSet {
    object_type: String,
    methods: Option<HashSet<String>>,
}

impl MethodSet {
    /// An open method set: every method name dispatches.
    pub fn dynamic(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            methods: None,
        }
    }

    /// A closed method set from a discovered schema.
    pub fn with_methods<I, S>(object_type: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object_type: object_type.into(),
            methods: Some(methods.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether this set dispatches the given method name.
    pub fn allows(&self, method: &str) -> bool {
        match &self.methods {
            Some(set) => set.contains(method),
            None => true,
        }
    }

    /// The object type this set was generated for.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Bind the method set to a live handle, producing the proxy.
    pub(crate) fn create(
        self: &Arc<Self>,
        session: Weak<SessionInner>,
        handle: Handle,
        object_id: String,
        delta: bool,
        generic_type: Option<String>,
    ) -> ObjectProxy {
        ObjectProxy {
            shared: Arc::new(ProxyShared {
                session,
                handle: AtomicI32::new(handle),
                object_id,
                generic_type,
                methods: Arc::clone(self),
                delta,
            }),
        }
    }
}

/// Default factory: no schema discovery, every type gets an open set.
pub struct DynamicProxyFactory;

impl ProxyFactory for DynamicProxyFactory {
    fn generate(&self, object_type: &str) -> MethodSet {
        MethodSet::dynamic(object_type)
    }
}

struct ProxyShared {
    session: Weak<SessionInner>,
    /// Current handle; rewritten in place during resume so the proxy
    /// keeps its identity across reconciliation
    handle: AtomicI32,
    object_id: String,
    generic_type: Option<String>,
    methods: Arc<MethodSet>,
    delta: bool,
}

/// Client-side stand-in for one server-side object.
///
/// Clones share the same underlying state; at most one proxy exists per
/// live handle, and everyone holding a clone observes handle rewrites
/// performed by resume.
#[derive(Clone)]
pub struct ObjectProxy {
    shared: Arc<ProxyShared>,
}

impl ObjectProxy {
    /// The handle this proxy currently points at.
    pub fn handle(&self) -> Handle {
        self.shared.handle.load(Ordering::SeqCst)
    }

    pub(crate) fn set_handle(&self, handle: Handle) {
        self.shared.handle.store(handle, Ordering::SeqCst);
    }

    /// Engine-side identity of the object, stable across handle rewrites.
    pub fn object_id(&self) -> &str {
        &self.shared.object_id
    }

    /// The object type the method surface was generated for.
    pub fn object_type(&self) -> &str {
        self.shared.methods.object_type()
    }

    /// Generic subtype, when the engine reported one.
    pub fn generic_type(&self) -> Option<&str> {
        self.shared.generic_type.as_deref()
    }

    /// Whether two proxies are the same underlying instance.
    pub fn ptr_eq(a: &ObjectProxy, b: &ObjectProxy) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    /// Invoke a remote method on this object.
    ///
    /// Builds `{ method, handle, params, delta }` and sends it through the
    /// session, so the full interceptor pipeline applies.
    pub fn call(&self, method: impl Into<String>, params: Value) -> PendingCall<Value> {
        let method = method.into();
        if !self.shared.methods.allows(&method) {
            return PendingCall::ready_err(Error::Protocol(format!(
                "method {} is not part of the {} surface",
                method,
                self.object_type()
            )));
        }
        let Some(session) = self.shared.session.upgrade() else {
            return PendingCall::ready_err(Error::Closed);
        };

        let mut request = Request::new(method, self.handle(), params);
        if !self.shared.delta {
            request.delta = Some(false);
        }
        SessionInner::send_request(&session, request)
    }

    /// Invoke a remote method and deserialize the result.
    pub fn call_typed<R>(&self, method: impl Into<String>, params: Value) -> PendingCall<R>
    where
        R: serde::de::DeserializeOwned + Send + 'static,
    {
        use futures::FutureExt;

        let call = self.call(method, params);
        let slot = call.id_slot();
        PendingCall::new(
            slot,
            async move {
                let value = call.await?;
                serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
            }
            .boxed(),
        )
    }
}

impl std::fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("handle", &self.handle())
            .field("object_id", &self.shared.object_id)
            .field("object_type", &self.object_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dynamic_set_allows_everything() {
        let set = MethodSet::dynamic("GenericObject");
        assert!(set.allows("GetLayout"));
        assert!(set.allows("AnythingAtAll"));
    }

    #[test]
    fn test_closed_set_restricts() {
        let set = MethodSet::with_methods("Doc", ["GetLayout", "GetObject"]);
        assert!(set.allows("GetLayout"));
        assert!(!set.allows("DoReload"));
    }

    #[test]
    fn test_factory_is_pure() {
        let factory = DynamicProxyFactory;
        let a = factory.generate("Doc");
        let b = factory.generate("Doc");
        assert_eq!(a.object_type(), b.object_type());
    }

    #[tokio::test]
    async fn test_call_on_dead_session_rejects() {
        let methods = Arc::new(MethodSet::dynamic("Doc"));
        let proxy = methods.create(Weak::new(), 4, "doc-1".to_string(), true, None);

        let call = proxy.call("GetLayout", json!([]));
        assert!(matches!(call.await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_unknown_method_rejected_locally() {
        let methods = Arc::new(MethodSet::with_methods("Doc", ["GetLayout"]));
        let proxy = methods.create(Weak::new(), 4, "doc-1".to_string(), true, None);

        let call = proxy.call("DoReload", json!([]));
        assert!(matches!(call.await, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_handle_rewrite_shared_across_clones() {
        let methods = Arc::new(MethodSet::dynamic("Doc"));
        let proxy = methods.create(Weak::new(), 4, "doc-1".to_string(), true, None);
        let clone = proxy.clone();

        proxy.set_handle(44);
        assert_eq!(clone.handle(), 44);
        assert!(ObjectProxy::ptr_eq(&proxy, &clone));
    }
}
