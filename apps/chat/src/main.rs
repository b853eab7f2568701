//! Minimal chat room: every message is broadcast to every connected client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sockjs::{handler_fn, EndpointConfig, SockJsEndpoint, SockjsMessage};

const CHAT_HTML: &str = include_str!("chat.html");

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let handler = handler_fn(|message, session| async move {
        // The session is detached from its manager between transports.
        let Some(manager) = session.manager() else {
            return Ok(());
        };

        match message {
            SockjsMessage::Open => manager.broadcast("Someone joined."),
            SockjsMessage::Message(text) => manager.broadcast(&text),
            SockjsMessage::Closed => manager.broadcast("Someone left."),
            SockjsMessage::Close(_) => {}
        }
        Ok(())
    });

    let endpoint = SockJsEndpoint::new(
        handler,
        EndpointConfig {
            name: "chat".to_string(),
            ..EndpointConfig::default()
        },
    );
    let manager = Arc::clone(endpoint.manager());

    let app = Router::new()
        .route("/", get(|| async { Html(CHAT_HTML) }))
        .merge(endpoint.router())
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("server error");

    // Drive every open session to CLOSED and disarm the GC before exiting.
    manager.clear().await;
    manager.stop();
}
