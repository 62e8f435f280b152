//! WebSocket stream bridge integration tests.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

mod common;

#[tokio::test]
async fn relays_frames_both_ways_and_keeps_query() {
    let (backend, queries) = common::start_ws_echo_backend().await;
    let root = tempfile::tempdir().unwrap();
    let gateway = common::start_gateway(&common::gateway_config(backend, root.path()), Some(backend)).await;

    let (mut socket, _) = connect_async(gateway.ws_url("/ws?clientId=abc")).await.unwrap();

    socket.send(Message::Text("{\"type\":\"status\"}".into())).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap();
    assert_eq!(echoed.unwrap().unwrap(), Message::Text("{\"type\":\"status\"}".into()));

    let payload = vec![1u8, 2, 3, 255];
    socket.send(Message::Binary(payload.clone().into())).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap();
    assert_eq!(echoed.unwrap().unwrap(), Message::Binary(payload.into()));

    assert_eq!(queries.lock().unwrap().as_slice(), ["clientId=abc"]);
    assert_eq!(gateway.sessions.active_count(), 1);

    socket.close(None).await.unwrap();
    assert!(gateway.sessions.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn client_close_reaches_silent_backend() {
    let (backend, mut closed) = common::start_silent_ws_backend().await;
    let root = tempfile::tempdir().unwrap();
    let gateway = common::start_gateway(&common::gateway_config(backend, root.path()), Some(backend)).await;

    let (mut socket, _) = connect_async(gateway.ws_url("/ws")).await.unwrap();
    assert_eq!(gateway.sessions.active_count(), 1);

    socket.close(None).await.unwrap();
    drop(socket);

    let observed = tokio::time::timeout(Duration::from_secs(5), closed.recv()).await;
    assert!(observed.is_ok(), "backend connection was not closed");
    assert!(gateway.sessions.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(gateway.sessions.active_count(), 0);
}

#[tokio::test]
async fn client_drop_without_close_frame_ends_session() {
    let (backend, mut closed) = common::start_silent_ws_backend().await;
    let root = tempfile::tempdir().unwrap();
    let gateway = common::start_gateway(&common::gateway_config(backend, root.path()), Some(backend)).await;

    let (socket, _) = connect_async(gateway.ws_url("/ws")).await.unwrap();
    drop(socket);

    let observed = tokio::time::timeout(Duration::from_secs(5), closed.recv()).await;
    assert!(observed.is_ok(), "backend connection was not closed");
    assert!(gateway.sessions.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn unreachable_backend_closes_client_with_1011() {
    let backend = common::unused_addr().await;
    let root = tempfile::tempdir().unwrap();
    let gateway = common::start_gateway(&common::gateway_config(backend, root.path()), Some(backend)).await;

    let (mut socket, _) = connect_async(gateway.ws_url("/ws")).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 1011),
        other => panic!("expected close frame, got {other:?}"),
    }
    assert!(gateway.sessions.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn plain_request_on_bridge_path_is_proxied() {
    let backend = common::start_echo_backend().await;
    let root = tempfile::tempdir().unwrap();
    let gateway = common::start_gateway(&common::gateway_config(backend, root.path()), Some(backend)).await;

    let res = common::client().get(gateway.url("/ws?x=1")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-echo-path"], "/ws");
    assert_eq!(res.headers()["x-echo-query"], "x=1");
    assert_eq!(gateway.sessions.active_count(), 0);
}
