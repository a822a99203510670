//! A send's future plus its request-id metadata
//!
//! Callers sometimes need the id the RPC layer assigned to a request while
//! the response is still in flight (to correlate logs, or to line the call
//! up with side-band events). [`PendingCall`] is the send pipeline's
//! future with a [`RequestIdSlot`] riding along: the slot is populated at
//! enqueue time, can be cloned off before awaiting, and survives through
//! [`PendingCall::map`] so every derived future exposes the same id.

use axon_core::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

/// Shared, write-once cell carrying the assigned request id.
///
/// Empty until the request is actually enqueued on the socket; requests
/// rejected before enqueue (state gate, interceptor rejection) never get
/// an id.
#[derive(Clone, Debug, Default)]
pub struct RequestIdSlot(Arc<OnceLock<u64>>);

impl RequestIdSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The assigned id, once the request reached the wire.
    pub fn get(&self) -> Option<u64> {
        self.0.get().copied()
    }

    pub(crate) fn set(&self, id: u64) {
        let _ = self.0.set(id);
    }
}

/// Future returned by `Session::send` and proxy calls.
///
/// Resolves with the interceptor-processed result. The id slot is shared
/// with every future derived through [`map`](PendingCall::map).
pub struct PendingCall<T = serde_json::Value> {
    id: RequestIdSlot,
    inner: BoxFuture<'static, Result<T>>,
}

impl<T> PendingCall<T> {
    pub(crate) fn new(id: RequestIdSlot, inner: BoxFuture<'static, Result<T>>) -> Self {
        Self { id, inner }
    }

    /// A call that failed before reaching the wire. The id slot stays
    /// empty.
    pub(crate) fn ready_err(error: Error) -> Self
    where
        T: Send + 'static,
    {
        Self {
            id: RequestIdSlot::new(),
            inner: futures::future::ready(Err(error)).boxed(),
        }
    }

    /// The id the RPC layer assigned, if the request was enqueued yet.
    pub fn request_id(&self) -> Option<u64> {
        self.id.get()
    }

    /// Clone the id slot out, e.g. to read the id after awaiting the call.
    pub fn id_slot(&self) -> RequestIdSlot {
        self.id.clone()
    }

    /// Transform the success value, preserving the id slot on the derived
    /// future.
    pub fn map<U, F>(self, f: F) -> PendingCall<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        PendingCall {
            id: self.id.clone(),
            inner: self.inner.map(|result| result.map(f)).boxed(),
        }
    }
}

impl<T> Future for PendingCall<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.poll_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_visible_after_resolution() {
        let slot = RequestIdSlot::new();
        let inner = slot.clone();
        let call: PendingCall<i32> = PendingCall::new(
            slot,
            async move {
                inner.set(7);
                Ok(42)
            }
            .boxed(),
        );

        let observer = call.id_slot();
        assert_eq!(observer.get(), None);

        let value = call.await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(observer.get(), Some(7));
    }

    #[tokio::test]
    async fn test_map_preserves_slot() {
        let slot = RequestIdSlot::new();
        slot.set(3);
        let call: PendingCall<i32> =
            PendingCall::new(slot, futures::future::ready(Ok(10)).boxed());

        let mapped = call.map(|v| v * 2);
        assert_eq!(mapped.request_id(), Some(3));
        assert_eq!(mapped.await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_ready_err_has_empty_slot() {
        let call: PendingCall<i32> = PendingCall::ready_err(Error::Suspended);
        assert_eq!(call.request_id(), None);
        assert!(matches!(call.await, Err(Error::Suspended)));
    }

    #[test]
    fn test_slot_set_once() {
        let slot = RequestIdSlot::new();
        slot.set(1);
        slot.set(2);
        assert_eq!(slot.get(), Some(1));
    }
}
