//! Shared test utilities: a mock engine server over real WebSockets
//!
//! Drives the client against actual socket traffic without a real engine.
//! The server captures every frame it receives (for wire assertions),
//! answers through a scripted handler, accepts any number of sequential
//! connections (so suspend/resume can reconnect), can push notifications,
//! and can drop its connections to simulate a network failure.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Mock engine endpoint for integration tests.
pub struct MockEngineServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    kill_tx: broadcast::Sender<()>,
    message_rx: mpsc::Receiver<String>,
    outbound: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
}

impl MockEngineServer {
    /// Start a server whose handler answers every incoming text frame.
    ///
    /// The handler returns `Some(frame)` to respond or `None` to stay
    /// silent. State shared across connections lives in the closure.
    pub async fn with_handler<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (kill_tx, _) = broadcast::channel::<()>(4);
        let (msg_tx, msg_rx) = mpsc::channel::<String>(100);
        let outbound: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>> =
            Arc::new(Mutex::new(Vec::new()));

        let handler = Arc::new(handler);
        let accept_shutdown = shutdown_tx.clone();
        let accept_kill = kill_tx.clone();
        let accept_outbound = Arc::clone(&outbound);

        tokio::spawn(async move {
            let mut shutdown_rx = accept_shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let handler = Arc::clone(&handler);
                        let msg_tx = msg_tx.clone();
                        let mut conn_shutdown = accept_shutdown.subscribe();
                        let mut conn_kill = accept_kill.subscribe();

                        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
                        accept_outbound.lock().unwrap().push(push_tx);

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else {
                                return;
                            };
                            let (mut write, mut read) = ws_stream.split();
                            loop {
                                tokio::select! {
                                    _ = conn_shutdown.recv() => {
                                        let _ = write.send(Message::Close(None)).await;
                                        break;
                                    }
                                    _ = conn_kill.recv() => {
                                        let _ = write.send(Message::Close(None)).await;
                                        break;
                                    }
                                    pushed = push_rx.recv() => {
                                        let Some(text) = pushed else { break };
                                        if write.send(Message::Text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    frame = read.next() => {
                                        match frame {
                                            Some(Ok(Message::Text(text))) => {
                                                let _ = msg_tx.send(text.clone()).await;
                                                if let Some(response) = handler(text).await {
                                                    if write.send(Message::Text(response)).await.is_err() {
                                                        break;
                                                    }
                                                }
                                            }
                                            Some(Ok(Message::Close(_))) | None => break,
                                            Some(Ok(_)) => {}
                                            Some(Err(_)) => break,
                                        }
                                    }
                                }
                            }
                        });
                    }
                }
            }
        });

        // Give the accept loop a moment to come up
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        Self {
            addr,
            shutdown_tx,
            kill_tx,
            message_rx: msg_rx,
            outbound,
        }
    }

    /// A server that answers every request with an empty success result.
    pub async fn echo_ok() -> Self {
        Self::with_handler(|text| async move {
            let frame: serde_json::Value = serde_json::from_str(&text).ok()?;
            Some(mock_response(frame["id"].as_u64()?, serde_json::json!({})))
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next frame the server received, within a 5 second deadline.
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(tokio::time::Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Push a frame to every connected client.
    pub fn push(&self, frame: String) {
        self.outbound
            .lock()
            .unwrap()
            .retain(|tx| tx.send(frame.clone()).is_ok());
    }

    /// Drop every live connection while continuing to accept new ones.
    /// Simulates a network failure between client and engine.
    pub async fn drop_connections(&self) {
        let _ = self.kill_tx.send(());
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    /// Stop accepting and close every connection.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

/// Install a subscriber once so `RUST_LOG=debug` surfaces client traces
/// when chasing a failing test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Success response frame.
pub fn mock_response(id: u64, result: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
    .to_string()
}

/// Error response frame.
pub fn mock_error_response(id: u64, code: i64, message: &str, parameter: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message, "parameter": parameter},
        "id": id,
    })
    .to_string()
}

/// Notification frame (no id).
pub fn mock_notification(method: &str, params: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Parse the id out of a captured request frame.
pub fn frame_id(frame: &str) -> u64 {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    value["id"].as_u64().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_shape() {
        let frame = mock_response(3, serde_json::json!({"v": 1}));
        assert!(frame.contains("\"id\":3"));
        assert!(frame.contains("\"result\""));
    }

    #[test]
    fn test_mock_error_shape() {
        let frame = mock_error_response(1, 2, "m", "p");
        assert!(frame.contains("\"code\":2"));
        assert!(frame.contains("\"parameter\":\"p\""));
    }

    #[test]
    fn test_mock_notification_has_no_id() {
        let frame = mock_notification("OnProgress", serde_json::json!({}));
        assert!(!frame.contains("\"id\""));
    }
}
