//! Registry of live handles and their proxies
//!
//! One entry per live handle, insertion-ordered. The cache owns the
//! entries; the session owns the cache. An entry exists exactly when the
//! engine considered the handle live at the last successful open or
//! resume.
//!
//! The cache also stores the delta patchees: the last full payload seen
//! per `(handle, method)`, which the delta interceptor patches against.

use crate::events::{emit, SessionEvent};
use crate::proxy::ObjectProxy;
use axon_core::Handle;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// One cached handle: the proxy plus the metadata resume needs to
/// reattach it.
pub struct CacheEntry {
    pub handle: Handle,
    pub object_id: String,
    pub generic_type: Option<String>,
    pub api: ObjectProxy,
    patchees: HashMap<String, Value>,
}

impl CacheEntry {
    pub fn new(
        handle: Handle,
        object_id: impl Into<String>,
        generic_type: Option<String>,
        api: ObjectProxy,
    ) -> Self {
        Self {
            handle,
            object_id: object_id.into(),
            generic_type,
            api,
            patchees: HashMap::new(),
        }
    }
}

pub(crate) struct ApiCache {
    entries: HashMap<Handle, CacheEntry>,
    order: Vec<Handle>,
    events: broadcast::Sender<SessionEvent>,
}

impl ApiCache {
    pub(crate) fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            events,
        }
    }

    /// Insert an entry. A collision replaces the existing entry in place
    /// (keeping its position) and emits no event; collisions are the
    /// caller's business.
    pub(crate) fn add(&mut self, entry: CacheEntry) {
        let handle = entry.handle;
        if self.entries.insert(handle, entry).is_none() {
            self.order.push(handle);
        }
    }

    /// Remove an entry and tell everyone holding the handle that it is
    /// gone.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<CacheEntry> {
        let entry = self.entries.remove(&handle);
        if entry.is_some() {
            self.order.retain(|h| *h != handle);
            emit(&self.events, SessionEvent::HandleClosed(handle));
        }
        entry
    }

    /// Announce a server-side state change for the handle.
    pub(crate) fn notify_changed(&self, handle: Handle) {
        emit(&self.events, SessionEvent::HandleChanged(handle));
    }

    pub(crate) fn get_api(&self, handle: Handle) -> Option<ObjectProxy> {
        self.entries.get(&handle).map(|e| e.api.clone())
    }

    /// All proxies in insertion order.
    pub(crate) fn apis(&self) -> Vec<ObjectProxy> {
        self.order
            .iter()
            .filter_map(|h| self.entries.get(h))
            .map(|e| e.api.clone())
            .collect()
    }

    /// `(handle, object id)` of every positive handle, insertion order —
    /// the reconciliation work list for resume.
    pub(crate) fn reattachable(&self) -> Vec<(Handle, String)> {
        self.order
            .iter()
            .filter(|h| **h > 0)
            .filter_map(|h| self.entries.get(h))
            .map(|e| (e.handle, e.object_id.clone()))
            .collect()
    }

    /// Move an entry to a new handle after resume reconciliation. The
    /// proxy is rewritten in place, so clones held by callers follow.
    pub(crate) fn rekey(&mut self, old: Handle, new: Handle) -> bool {
        let Some(mut entry) = self.entries.remove(&old) else {
            return false;
        };
        entry.handle = new;
        entry.api.set_handle(new);
        for slot in self.order.iter_mut() {
            if *slot == old {
                *slot = new;
            }
        }
        self.entries.insert(new, entry);
        true
    }

    /// Last full payload seen for `(handle, method)`.
    pub(crate) fn get_patchee(&self, handle: Handle, method: &str) -> Option<Value> {
        self.entries
            .get(&handle)
            .and_then(|e| e.patchees.get(method).cloned())
    }

    pub(crate) fn set_patchee(&mut self, handle: Handle, method: &str, value: Value) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.patchees.insert(method.to_string(), value);
        }
    }

    /// Drop every entry, emitting a close event per handle in insertion
    /// order. Session teardown.
    pub(crate) fn clear_emitting(&mut self) {
        let handles: Vec<Handle> = self.order.drain(..).collect();
        self.entries.clear();
        for handle in handles {
            emit(&self.events, SessionEvent::HandleClosed(handle));
        }
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::proxy::MethodSet;
    use serde_json::json;
    use std::sync::{Arc, Weak};

    fn proxy(handle: Handle, id: &str) -> ObjectProxy {
        Arc::new(MethodSet::dynamic("GenericObject")).create(
            Weak::new(),
            handle,
            id.to_string(),
            true,
            None,
        )
    }

    fn entry(handle: Handle, id: &str) -> CacheEntry {
        CacheEntry::new(handle, id, None, proxy(handle, id))
    }

    #[test]
    fn test_add_and_lookup() {
        let tx = events::channel();
        let mut cache = ApiCache::new(tx);

        cache.add(entry(2, "a"));
        cache.add(entry(3, "b"));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(2));
        assert_eq!(cache.get_api(3).unwrap().object_id(), "b");
        assert!(cache.get_api(9).is_none());
    }

    #[test]
    fn test_insertion_order_iteration() {
        let tx = events::channel();
        let mut cache = ApiCache::new(tx);

        cache.add(entry(5, "e"));
        cache.add(entry(2, "b"));
        cache.add(entry(9, "x"));

        let ids: Vec<String> = cache
            .apis()
            .iter()
            .map(|p| p.object_id().to_string())
            .collect();
        assert_eq!(ids, vec!["e", "b", "x"]);
    }

    #[test]
    fn test_replace_emits_no_event() {
        let tx = events::channel();
        let mut rx = tx.subscribe();
        let mut cache = ApiCache::new(tx);

        cache.add(entry(2, "a"));
        cache.add(entry(2, "a-replaced"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_api(2).unwrap().object_id(), "a-replaced");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_emits_closed() {
        let tx = events::channel();
        let mut rx = tx.subscribe();
        let mut cache = ApiCache::new(tx);

        cache.add(entry(7, "a"));
        assert!(cache.remove(7).is_some());
        assert!(cache.remove(7).is_none());

        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::HandleClosed(7)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rekey_preserves_proxy_identity_and_order() {
        let tx = events::channel();
        let mut cache = ApiCache::new(tx);

        cache.add(entry(2, "a"));
        cache.add(entry(3, "b"));

        let before = cache.get_api(2).unwrap();
        assert!(cache.rekey(2, 22));
        assert!(!cache.rekey(99, 100));

        let after = cache.get_api(22).unwrap();
        assert!(ObjectProxy::ptr_eq(&before, &after));
        assert_eq!(before.handle(), 22);
        assert!(!cache.contains(2));

        let ids: Vec<String> = cache.apis().iter().map(|p| p.object_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_reattachable_skips_global() {
        let tx = events::channel();
        let mut cache = ApiCache::new(tx);

        cache.add(entry(axon_core::GLOBAL_HANDLE, "global"));
        cache.add(entry(2, "a"));
        cache.add(entry(3, "b"));

        let work: Vec<(Handle, String)> = cache.reattachable();
        assert_eq!(work, vec![(2, "a".to_string()), (3, "b".to_string())]);
    }

    #[test]
    fn test_patchee_storage() {
        let tx = events::channel();
        let mut cache = ApiCache::new(tx);
        cache.add(entry(2, "a"));

        assert!(cache.get_patchee(2, "GetLayout").is_none());
        cache.set_patchee(2, "GetLayout", json!({"v": 1}));
        assert_eq!(cache.get_patchee(2, "GetLayout"), Some(json!({"v": 1})));

        // Unknown handle: silently ignored
        cache.set_patchee(99, "GetLayout", json!({}));
        assert!(cache.get_patchee(99, "GetLayout").is_none());
    }

    #[test]
    fn test_clear_emitting_announces_each_handle() {
        let tx = events::channel();
        let mut rx = tx.subscribe();
        let mut cache = ApiCache::new(tx);

        cache.add(entry(2, "a"));
        cache.add(entry(3, "b"));
        cache.clear_emitting();

        assert_eq!(cache.len(), 0);
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::HandleClosed(2)));
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::HandleClosed(3)));
    }
}
