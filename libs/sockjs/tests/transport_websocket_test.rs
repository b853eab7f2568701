mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

use sockjs::{EndpointConfig, SessionState};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: String) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    stream
}

async fn next_text(stream: &mut WsStream) -> String {
    loop {
        let msg = time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timeout waiting for ws message")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => return text.as_str().to_owned(),
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("unexpected ws message: {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// SockJS-framed WebSocket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn websocket_echo_roundtrip() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, manager) = common::start_server(&endpoint).await;

    let mut stream = connect(format!("ws://{addr}/sockjs/000/s2/websocket")).await;

    assert_eq!(next_text(&mut stream).await, "o");
    assert_eq!(next_text(&mut stream).await, "a[\"open\"]");

    stream
        .send(tungstenite::Message::Text("[\"hello\"]".into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut stream).await, "a[\"hello world\"]");

    // A bare JSON string works too.
    stream
        .send(tungstenite::Message::Text("\"again\"".into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut stream).await, "a[\"again world\"]");

    // The handler closes the session on "close".
    stream
        .send(tungstenite::Message::Text("\"close\"".into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut stream).await, "c[3000,\"Go away!\"]");

    // The server follows up with a close frame and the session dies.
    loop {
        match stream.next().await {
            Some(Ok(tungstenite::Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(_)) => break,
        }
    }

    let session = manager.get("s2").expect("session registered");
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while session.state() != SessionState::Closed {
        assert!(time::Instant::now() < deadline, "session never closed");
        time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn websocket_second_connection_is_refused() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, _manager) = common::start_server(&endpoint).await;

    let mut first = connect(format!("ws://{addr}/sockjs/000/s1/websocket")).await;
    assert_eq!(next_text(&mut first).await, "o");

    let mut second = connect(format!("ws://{addr}/sockjs/000/s1/websocket")).await;
    assert_eq!(
        next_text(&mut second).await,
        "c[2010,\"Another connection still open\"]"
    );
}

#[tokio::test]
async fn websocket_broken_json_closes_session() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, manager) = common::start_server(&endpoint).await;

    let mut stream = connect(format!("ws://{addr}/sockjs/000/s1/websocket")).await;
    assert_eq!(next_text(&mut stream).await, "o");

    stream
        .send(tungstenite::Message::Text("not json".into()))
        .await
        .unwrap();

    loop {
        match stream.next().await {
            Some(Ok(tungstenite::Message::Close(_))) | None => break,
            _ => continue,
        }
    }

    let session = manager.get("s1").unwrap();
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while session.state() != SessionState::Closed {
        assert!(time::Instant::now() < deadline, "session never closed");
        time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn websocket_disconnect_closes_session() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, manager) = common::start_server(&endpoint).await;

    let mut stream = connect(format!("ws://{addr}/sockjs/000/s1/websocket")).await;
    assert_eq!(next_text(&mut stream).await, "o");
    drop(stream);

    let session = manager.get("s1").unwrap();
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while session.state() != SessionState::Closed {
        assert!(time::Instant::now() < deadline, "session never closed");
        time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!session.acquired());
}

#[tokio::test]
async fn websocket_interrupted_session_reports_1002() {
    let endpoint = common::broken_open_endpoint(EndpointConfig::default());
    let (addr, _manager) = common::start_server(&endpoint).await;

    // First connection trips the failing open handler.
    let mut first = connect(format!("ws://{addr}/sockjs/000/s1/websocket")).await;
    assert_eq!(next_text(&mut first).await, "o");
    assert_eq!(next_text(&mut first).await, "c[3000,\"Internal error\"]");
    drop(first);

    let mut second = connect(format!("ws://{addr}/sockjs/000/s1/websocket")).await;
    assert_eq!(
        next_text(&mut second).await,
        "c[1002,\"Connection interrupted\"]"
    );
}

// ---------------------------------------------------------------------------
// Raw WebSocket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn raw_websocket_carries_bare_messages() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, manager) = common::start_server(&endpoint).await;

    let mut stream = connect(format!("ws://{addr}/sockjs/websocket")).await;

    // The open frame never reaches the wire; the handler greeting does,
    // unframed.
    assert_eq!(next_text(&mut stream).await, "open");

    stream
        .send(tungstenite::Message::Text("hello".into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut stream).await, "hello world");

    // Server-side sends arrive as plain text.
    let session = manager.active_sessions().pop().expect("session exists");
    session.send("test msg");
    assert_eq!(next_text(&mut stream).await, "test msg");

    // Broadcast blobs are unwrapped back to bare messages.
    manager.broadcast("to everyone");
    assert_eq!(next_text(&mut stream).await, "to everyone");

    drop(stream);
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while session.state() != SessionState::Closed {
        assert!(time::Instant::now() < deadline, "session never closed");
        time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn raw_websocket_sessions_are_per_connection() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, manager) = common::start_server(&endpoint).await;

    let mut first = connect(format!("ws://{addr}/sockjs/websocket")).await;
    let mut second = connect(format!("ws://{addr}/sockjs/websocket")).await;
    assert_eq!(next_text(&mut first).await, "open");
    assert_eq!(next_text(&mut second).await, "open");

    let sessions = manager.active_sessions();
    assert_eq!(sessions.len(), 2);
    assert_ne!(sessions[0].id(), sessions[1].id());
    // Protocol-format ids: nine digits.
    for session in &sessions {
        assert_eq!(session.id().len(), 9);
        assert!(session.id().chars().all(|c| c.is_ascii_digit()));
    }
}

// ---------------------------------------------------------------------------
// Disabled websocket transport
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_websocket_closes_with_10001() {
    let endpoint = common::echo_endpoint(EndpointConfig {
        disabled_transports: ["websocket".to_string()].into(),
        ..EndpointConfig::default()
    });
    let (addr, _manager) = common::start_server(&endpoint).await;

    let mut stream = connect(format!("ws://{addr}/sockjs/000/s1/websocket")).await;
    loop {
        match stream.next().await {
            Some(Ok(tungstenite::Message::Close(frame))) => {
                let frame = frame.expect("close frame with code");
                assert_eq!(u16::from(frame.code), 10001);
                break;
            }
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}
