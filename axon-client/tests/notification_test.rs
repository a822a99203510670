//! Notification fan-out integration tests

mod common;

use axon_client::{Session, SessionEvent};
use common::{mock_notification, MockEngineServer};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

#[tokio::test]
async fn test_notification_reaches_typed_and_wildcard_handlers() {
    let server = MockEngineServer::echo_ok().await;
    let session = Session::builder(server.url()).build();
    session.open().await.unwrap();

    let typed: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let wildcard: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let typed_clone = Arc::clone(&typed);
    session
        .on_notification("OnProgress", move |params| {
            let sink = Arc::clone(&typed_clone);
            async move {
                sink.lock().await.push(params);
            }
        })
        .await;

    let wildcard_clone = Arc::clone(&wildcard);
    session
        .on_any_notification(move |method, _params| {
            let sink = Arc::clone(&wildcard_clone);
            async move {
                sink.lock().await.push(method);
            }
        })
        .await;

    let mut events = session.subscribe();
    server.push(mock_notification("OnProgress", json!({"pct": 40})));
    server.push(mock_notification("OnReloadStarted", json!({})));

    // The broadcast stream carries both, in socket order
    let mut methods = Vec::new();
    while methods.len() < 2 {
        match timeout(Duration::from_secs(5), events.recv()).await.unwrap() {
            Ok(SessionEvent::Notification { method, .. }) => methods.push(method),
            Ok(_) => {}
            Err(e) => panic!("event stream broke: {e}"),
        }
    }
    assert_eq!(methods, vec!["OnProgress", "OnReloadStarted"]);

    // Typed handler saw only its method, the wildcard saw both
    assert_eq!(typed.lock().await.as_slice(), &[json!({"pct": 40})]);
    assert_eq!(
        wildcard.lock().await.as_slice(),
        &["OnProgress".to_string(), "OnReloadStarted".to_string()]
    );

    session.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_unhandled_notification_does_not_break_the_session() {
    let server = MockEngineServer::echo_ok().await;
    let session = Session::builder(server.url()).build();
    session.open().await.unwrap();

    server.push(mock_notification("OnNobodyListens", json!({})));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The session is still fully usable afterwards
    let result = session
        .send(axon_core::Request::global("Ping", json!([])))
        .await;
    assert!(result.is_ok());

    session.close().await.unwrap();
    server.shutdown().await;
}
