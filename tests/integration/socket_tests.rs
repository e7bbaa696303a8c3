//! Messaging socket against a local tokio-tungstenite server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use dsp_courier::channel::protocol::OutboundFrame;
use dsp_courier::channel::socket::{spawn_socket, SocketHandle, SocketSettings};
use dsp_courier::channel::ChannelTransport;
use dsp_courier::models::message::WireMessage;
use dsp_courier::AppError;

use super::test_helpers::DRIVER_ID;

const WAIT: Duration = Duration::from_secs(5);

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("client connects")
        .expect("accept");
    tokio_tungstenite::accept_async(stream).await.expect("handshake")
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("frame");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

fn settings(url: &str) -> SocketSettings {
    SocketSettings {
        url: url.to_owned(),
        driver_id: DRIVER_ID.to_owned(),
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(100),
        queue_capacity: 8,
    }
}

async fn wait_connected(handle: &SocketHandle) {
    tokio::time::timeout(WAIT, async {
        while !handle.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("socket joins");
}

#[tokio::test]
async fn joins_room_and_forwards_messages() {
    let (listener, url) = listen().await;
    let (handle, mut inbound) = spawn_socket(settings(&url), CancellationToken::new());

    let mut server = accept(&listener).await;
    assert_eq!(next_json(&mut server).await, json!({"event": "join", "data": DRIVER_ID}));

    server
        .send(Message::Text(
            json!({"event": "typing", "data": {}}).to_string().into(),
        ))
        .await
        .expect("send typing");
    server
        .send(Message::Text(
            json!({
                "event": "receiveMessage",
                "data": {"_id": "m1", "from": "customer-n1", "to": DRIVER_ID, "content": "Ring twice"}
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send message");

    let received = tokio::time::timeout(WAIT, inbound.recv())
        .await
        .expect("inbound before timeout")
        .expect("inbound open");
    assert_eq!(received.id.as_deref(), Some("m1"));
    assert_eq!(received.content, "Ring twice");

    wait_connected(&handle).await;
    handle
        .publish(OutboundFrame::SendMessage(WireMessage::outbound(
            DRIVER_ID,
            "customer-n1",
            "Will do",
        )))
        .await
        .expect("publish");
    assert_eq!(
        next_json(&mut server).await,
        json!({
            "event": "sendMessage",
            "data": {"from": DRIVER_ID, "to": "customer-n1", "content": "Will do"}
        })
    );

    handle.await_completion().await;
}

#[tokio::test]
async fn rejoins_after_server_drops_connection() {
    let (listener, url) = listen().await;
    let (handle, _inbound) = spawn_socket(settings(&url), CancellationToken::new());

    let mut first = accept(&listener).await;
    assert_eq!(next_json(&mut first).await["event"], "join");
    first.close(None).await.expect("close");
    drop(first);

    let mut second = accept(&listener).await;
    assert_eq!(next_json(&mut second).await, json!({"event": "join", "data": DRIVER_ID}));

    handle.await_completion().await;
}

#[tokio::test]
async fn publish_fails_while_disconnected() {
    // Nothing listens on the reserved port, so the socket never connects.
    let (listener, url) = listen().await;
    drop(listener);
    let (handle, _inbound) = spawn_socket(settings(&url), CancellationToken::new());

    let err = handle
        .publish(OutboundFrame::Join(DRIVER_ID.into()))
        .await
        .expect_err("not connected");
    assert!(matches!(err, AppError::Channel(_)));
    assert!(!handle.is_connected());

    handle.await_completion().await;
}

#[tokio::test]
async fn cancellation_closes_the_socket() {
    let (listener, url) = listen().await;
    let cancel = CancellationToken::new();
    let (handle, mut inbound) = spawn_socket(settings(&url), cancel.child_token());

    let mut server = accept(&listener).await;
    next_json(&mut server).await;
    wait_connected(&handle).await;

    cancel.cancel();
    let closed = tokio::time::timeout(WAIT, inbound.recv())
        .await
        .expect("task exits");
    assert!(closed.is_none(), "inbound sender dropped with the task");
    assert!(!handle.is_connected());
}
