//! Socket adapter over a duplex text-message channel
//!
//! The session core never touches a WebSocket directly. It talks to a
//! [`SocketConnection`]: an outgoing command sender and an incoming event
//! receiver. [`WsSocketFactory`] is the production implementation over
//! tokio-tungstenite; tests inject their own factory to drive a session
//! without a network.
//!
//! The factory seam is also what makes suspend/resume possible: resuming
//! simply asks the factory for a fresh connection while the logical
//! session state survives above it.

use axon_core::{Error, Result};
use futures::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Close code for an abnormal closure (stream ended without a close frame).
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Close code for a deliberate, user-initiated close.
pub const NORMAL_CLOSE: u16 = 1000;

/// Events surfaced by a socket connection.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A complete text frame arrived
    Message(String),
    /// The socket closed; `code` is the close code from the peer, or 1006
    /// when the stream ended without one
    Closed { code: u16, reason: String },
    /// A transport-level error occurred
    Error(String),
}

/// Commands accepted by a socket connection.
#[derive(Debug)]
pub enum SocketCommand {
    /// Send a text frame
    Text(String),
    /// Close the socket with the given code and reason
    Close { code: u16, reason: String },
}

/// One live duplex channel: commands go out, events come in.
pub struct SocketConnection {
    /// Outgoing command sender
    pub commands: mpsc::UnboundedSender<SocketCommand>,
    /// Incoming event receiver
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Factory that opens socket connections. This is the `createSocket`
/// override seam: the session asks its configured factory for a
/// connection both at open and at resume.
pub trait SocketFactory: Send + Sync {
    /// Open a connection to the given endpoint.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<SocketConnection>>;
}

/// Production factory over tokio-tungstenite.
///
/// Splits the WebSocket into a sink fed by a writer task and a stream
/// drained by a reader task, both bridged onto unbounded channels.
pub struct WsSocketFactory;

impl SocketFactory for WsSocketFactory {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<SocketConnection>> {
        let url = url.to_string();
        Box::pin(async move {
            tracing::debug!(url = %url, "opening socket");
            let (ws_stream, _) = connect_async(&url)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;

            let (mut sink, mut stream) = ws_stream.split();
            let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<SocketCommand>();
            let (evt_tx, evt_rx) = mpsc::unbounded_channel::<SocketEvent>();

            // Writer: drain commands into the sink until the channel or the
            // sink goes away. A close command terminates the task.
            tokio::spawn(async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        SocketCommand::Text(text) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        SocketCommand::Close { code, reason } => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            break;
                        }
                    }
                }
            });

            // Reader: forward text frames and surface the close code. A
            // stream that ends without a close frame is an abnormal closure.
            tokio::spawn(async move {
                let mut announced = false;
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            if evt_tx.send(SocketEvent::Message(text)).is_err() {
                                return;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.into_owned()))
                                .unwrap_or((1005, String::new()));
                            let _ = evt_tx.send(SocketEvent::Closed { code, reason });
                            announced = true;
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = evt_tx.send(SocketEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
                if !announced {
                    let _ = evt_tx.send(SocketEvent::Closed {
                        code: ABNORMAL_CLOSE,
                        reason: "abnormal closure".to_string(),
                    });
                }
            });

            Ok(SocketConnection {
                commands: cmd_tx,
                events: evt_rx,
            })
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process socket factory for unit tests: each scripted connection
    //! hands the test the far end of both channels.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) struct ScriptedSocketFactory {
        queue: Mutex<VecDeque<SocketConnection>>,
    }

    impl ScriptedSocketFactory {
        pub(crate) fn new() -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
            }
        }

        /// Queue one connection and return its far ends: the command
        /// receiver (what the session wrote) and the event sender (what
        /// the fake server pushes).
        pub(crate) fn script_connection(
            &self,
        ) -> (
            mpsc::UnboundedReceiver<SocketCommand>,
            mpsc::UnboundedSender<SocketEvent>,
        ) {
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let (evt_tx, evt_rx) = mpsc::unbounded_channel();
            self.queue.lock().unwrap().push_back(SocketConnection {
                commands: cmd_tx,
                events: evt_rx,
            });
            (cmd_rx, evt_tx)
        }
    }

    impl SocketFactory for ScriptedSocketFactory {
        fn connect(&self, _url: &str) -> BoxFuture<'static, Result<SocketConnection>> {
            let conn = self.queue.lock().unwrap().pop_front();
            Box::pin(async move {
                conn.ok_or_else(|| Error::Transport("no scripted connection left".to_string()))
            })
        }
    }
}
