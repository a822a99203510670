//! Suspend and resume
//!
//! Suspending drops the transport while keeping the logical session: the
//! cache and every proxy survive, outstanding requests are rejected with
//! "Session suspended", and socket events are ignored until resume.
//!
//! Resuming re-opens the socket (the id counter restarts with the
//! connection) and reconciles every cached positive handle by asking the
//! global handle for the object's current handle (`GetObject` with the
//! object id). Outcomes per entry:
//!
//! - the engine returns a handle → the cache entry is rekeyed and the
//!   proxy's handle rewritten in place, preserving its identity;
//! - the engine answers with an error → the object no longer exists; with
//!   `only_if_attached` the whole resume fails, otherwise the handle is
//!   reported as lost;
//! - the transport fails → the resume aborts and the session reverts to
//!   suspended.
//!
//! Nothing mutates until every reattach call has settled, so an aborted
//! resume leaves the suspended cache exactly as it was.

use crate::events::{self, SessionEvent};
use crate::session::{Session, SessionState};
use crate::socket::NORMAL_CLOSE;
use axon_core::{Error, Handle, Request, Result};
use serde_json::{json, Value};

impl Session {
    /// Drop the transport, keep the logical state.
    ///
    /// Suspending an open session always succeeds; suspending twice is a
    /// no-op. Emits `Suspended` exactly once per transition.
    #[tracing::instrument(skip(self))]
    pub async fn suspend(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                SessionState::Opened => *state = SessionState::Suspending,
                SessionState::Suspended => return Ok(()),
                _ => return Err(Error::Closed),
            }
        }

        self.inner.rpc.fail_all(Error::Suspended);
        self.inner.rpc.close(NORMAL_CLOSE, "session suspended");
        self.inner.clear_open_future();

        *self.inner.state.lock().unwrap() = SessionState::Suspended;
        events::emit(&self.inner.events, SessionEvent::Suspended);
        tracing::info!("session suspended");
        Ok(())
    }

    /// Re-establish the transport and reconcile every cached handle.
    ///
    /// With `only_if_attached`, a single unrecoverable object fails the
    /// whole resume. Without it, lost handles are removed from the cache
    /// (each emitting `HandleClosed`) and reported in the `Resumed`
    /// event's `closed` list.
    ///
    /// On any failure the session reverts to suspended.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, only_if_attached: bool) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                SessionState::Suspended => *state = SessionState::Resuming,
                SessionState::Opened => return Ok(()),
                _ => return Err(Error::Closed),
            }
        }

        match self.reconcile(only_if_attached).await {
            Ok(lost) => {
                *self.inner.state.lock().unwrap() = SessionState::Opened;
                tracing::info!(lost = lost.len(), "session resumed");
                events::emit(&self.inner.events, SessionEvent::Resumed { closed: lost });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "resume failed, reverting to suspended");
                self.inner.rpc.close(NORMAL_CLOSE, "resume aborted");
                *self.inner.state.lock().unwrap() = SessionState::Suspended;
                Err(e)
            }
        }
    }

    async fn reconcile(&self, only_if_attached: bool) -> Result<Vec<Handle>> {
        let inner = &self.inner;
        inner
            .rpc
            .open(inner.config.socket_factory.as_ref(), &inner.config.url)
            .await?;

        let work = inner.cache.lock().unwrap().reattachable();
        let mut remap: Vec<(Handle, Handle)> = Vec::new();
        let mut lost: Vec<Handle> = Vec::new();

        for (handle, object_id) in work {
            let mut request =
                Request::global("GetObject", json!({"id": object_id})).with_delta(false);
            let rx = inner.rpc.submit(&mut request)?;

            let response = match rx.await {
                Ok(Ok(response)) => response,
                // Transport-level failure aborts the whole reconciliation
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(Error::Closed),
            };

            if let Some(error) = response.error {
                if only_if_attached {
                    return Err(Error::Reattach(format!(
                        "object {object_id} could not be recovered: {error}"
                    )));
                }
                tracing::debug!(handle, object_id = %object_id, "object lost during resume");
                lost.push(handle);
                continue;
            }

            let new_handle = response
                .result
                .as_ref()
                .and_then(|r| r.get("handle"))
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    Error::Protocol("reattach response carried no handle".to_string())
                })? as Handle;
            remap.push((handle, new_handle));
        }

        // Apply only now that every call settled: an abort above leaves
        // the suspended cache untouched.
        let mut cache = inner.cache.lock().unwrap();
        for (old, new) in remap {
            cache.rekey(old, new);
        }
        for handle in &lost {
            cache.remove(*handle);
        }
        Ok(lost)
    }
}
