//! Shared helpers for endpoint integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use sockjs::{handler_fn, EndpointConfig, SessionManager, SockJsEndpoint, SockjsMessage};

/// Handler used across the transport tests: greets with `"open"`, echoes
/// messages with a `" world"` suffix, and closes the session on `"close"`.
pub fn echo_endpoint(config: EndpointConfig) -> SockJsEndpoint {
    let handler = handler_fn(|message, session| async move {
        match message {
            SockjsMessage::Open => session.send("open"),
            SockjsMessage::Message(text) if text == "close" => session.close(),
            SockjsMessage::Message(text) => session.send(format!("{text} world")),
            _ => {}
        }
        Ok(())
    });
    SockJsEndpoint::new(handler, config)
}

/// Endpoint whose handler fails while opening, leaving sessions interrupted.
pub fn broken_open_endpoint(config: EndpointConfig) -> SockJsEndpoint {
    let handler = handler_fn(|message, _session| async move {
        match message {
            SockjsMessage::Open => Err("open handler failed".into()),
            _ => Ok(()),
        }
    });
    SockJsEndpoint::new(handler, config)
}

/// Serve the endpoint on an ephemeral port. The server task runs until the
/// test's runtime shuts down.
pub async fn start_server(endpoint: &SockJsEndpoint) -> (SocketAddr, Arc<SessionManager>) {
    let app = endpoint.router();
    let manager = Arc::clone(endpoint.manager());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, manager)
}
