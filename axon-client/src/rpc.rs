//! Request framing, id allocation and response correlation
//!
//! The RPC layer owns the socket exclusively. Outgoing requests get an id
//! and a dedicated oneshot channel; the read loop completes the matching
//! channel when the response arrives. Frames without an id are forwarded
//! upward as notifications.
//!
//! # Request lifecycle
//!
//! 1. `submit` allocates the next id and mutates it into the request
//! 2. the request is encoded and written to the socket
//! 3. the caller awaits the returned oneshot receiver
//! 4. the read loop matches the response by id and completes the channel
//!
//! Every outstanding entry settles exactly once: with the response, with a
//! bulk rejection at close/suspend, or with a rejection when the socket
//! dies. The id counter restarts at zero on every successful open, so ids
//! are strictly increasing from 1 within one socket connection.
//!
//! The active sender, the outstanding table and the connection generation
//! live under a single lock. A `submit` therefore either completes in full
//! against the live connection — entry registered, frame written — or
//! observes the connection already torn down and rejects; there is no
//! window for `close` to drain the table between a submit's active check
//! and its registration.

use crate::socket::{SocketCommand, SocketEvent, SocketFactory};
use axon_core::{codec, EngineMessage, Error, Notification, Request, Response, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Events the RPC layer forwards to the session.
#[derive(Debug)]
pub(crate) enum RpcEvent {
    /// A standalone frame without an id
    Notification(Notification),
    /// The socket closed with the given code
    Closed { code: u16 },
    /// A transport-level error was reported by the socket
    SocketError(String),
}

/// Connection-scoped state. Everything that must change together on
/// open/close — the writer handle, the outstanding table and the
/// generation — changes under this one lock.
struct Link {
    /// Bumped on every open/close so read loops of torn-down connections
    /// recognize themselves as stale and go silent.
    generation: u64,
    active: Option<mpsc::UnboundedSender<SocketCommand>>,
    pending: HashMap<u64, oneshot::Sender<Result<Response>>>,
}

pub(crate) struct Rpc {
    link: Arc<Mutex<Link>>,
    counter: AtomicU64,
    events: mpsc::UnboundedSender<RpcEvent>,
}

impl Rpc {
    pub(crate) fn new(events: mpsc::UnboundedSender<RpcEvent>) -> Self {
        Self {
            link: Arc::new(Mutex::new(Link {
                generation: 0,
                active: None,
                pending: HashMap::new(),
            })),
            counter: AtomicU64::new(0),
            events,
        }
    }

    /// Connect through the factory, reset the id counter and start the
    /// read loop for the new connection.
    pub(crate) async fn open(&self, factory: &dyn SocketFactory, url: &str) -> Result<()> {
        let conn = factory.connect(url).await?;

        let (generation, leftovers) = {
            let mut link = self.link.lock().unwrap();
            link.generation += 1;
            link.active = Some(conn.commands);
            let leftovers: Vec<_> = link.pending.drain().collect();
            (link.generation, leftovers)
        };
        // Anything still outstanding belonged to a previous connection
        for (_, tx) in leftovers {
            let _ = tx.send(Err(Error::Closed));
        }
        self.counter.store(0, Ordering::SeqCst);

        tokio::spawn(read_loop(
            conn.events,
            Arc::clone(&self.link),
            self.events.clone(),
            generation,
        ));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.link.lock().unwrap().active.is_some()
    }

    /// Allocate the next id, mutate it into the request, write the frame
    /// and register the outstanding entry, all in one critical section.
    ///
    /// Synchronous so the caller can observe the assigned id before
    /// awaiting the receiver.
    pub(crate) fn submit(&self, request: &mut Request) -> Result<oneshot::Receiver<Result<Response>>> {
        let mut link = self.link.lock().unwrap();
        let Some(out) = link.active.as_ref() else {
            return Err(Error::Closed);
        };

        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        request.id = Some(id);
        let text = codec::encode(request)?;

        if out.send(SocketCommand::Text(text)).is_err() {
            return Err(Error::Transport("socket write failed".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        link.pending.insert(id, tx);
        tracing::debug!(id, method = %request.method, handle = request.handle, "request sent");
        Ok(rx)
    }

    /// Close the socket and reject everything outstanding with
    /// [`Error::Closed`].
    pub(crate) fn close(&self, code: u16, reason: &str) {
        let (taken, drained) = {
            let mut link = self.link.lock().unwrap();
            link.generation += 1;
            let drained: Vec<_> = link.pending.drain().collect();
            (link.active.take(), drained)
        };
        if let Some(out) = taken {
            let _ = out.send(SocketCommand::Close {
                code,
                reason: reason.to_string(),
            });
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::Closed));
        }
    }

    /// Reject every outstanding request with the given error.
    pub(crate) fn fail_all(&self, error: Error) {
        let drained: Vec<_> = self.link.lock().unwrap().pending.drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.link.lock().unwrap().pending.len()
    }
}

/// Drain socket events for one connection. Stops forwarding as soon as a
/// newer connection (or a close) bumps the generation.
async fn read_loop(
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    link: Arc<Mutex<Link>>,
    out: mpsc::UnboundedSender<RpcEvent>,
    generation: u64,
) {
    let mut close_code = crate::socket::ABNORMAL_CLOSE;

    while let Some(event) = events.recv().await {
        if link.lock().unwrap().generation != generation {
            return;
        }
        match event {
            SocketEvent::Message(text) => match codec::decode(&text) {
                Ok(EngineMessage::Response(response)) => {
                    let entry = link.lock().unwrap().pending.remove(&response.id);
                    match entry {
                        Some(tx) => {
                            let _ = tx.send(Ok(response));
                        }
                        None => {
                            tracing::debug!(id = response.id, "dropping response with unknown id");
                        }
                    }
                }
                Ok(EngineMessage::Notification(notification)) => {
                    let _ = out.send(RpcEvent::Notification(notification));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed frame");
                }
            },
            SocketEvent::Closed { code, .. } => {
                close_code = code;
                break;
            }
            SocketEvent::Error(e) => {
                tracing::error!(error = %e, "socket error");
                let _ = out.send(RpcEvent::SocketError(e));
            }
        }
    }

    // Terminal teardown for this connection: the staleness check and the
    // drain happen under the same lock, so a racing open/close either
    // already took over (we go silent) or sees an empty table afterwards.
    let leftovers = {
        let mut link = link.lock().unwrap();
        if link.generation != generation {
            return;
        }
        link.active = None;
        link.pending.drain().collect::<Vec<_>>()
    };
    for (_, tx) in leftovers {
        let _ = tx.send(Err(Error::Closed));
    }
    let _ = out.send(RpcEvent::Closed { code: close_code });
}
