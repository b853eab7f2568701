//! Server-side [SockJS](https://github.com/sockjs/sockjs-protocol) for axum.
//!
//! Clients connect once at the SockJS layer and see a uniform message
//! channel; the server multiplexes it over WebSockets or one of the HTTP
//! fallback transports (XHR polling/streaming, EventSource, HTMLFile,
//! JSONP). Sessions survive across transport connections until they time
//! out or either side closes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sockjs::{handler_fn, EndpointConfig, SockJsEndpoint, SockjsMessage};
//!
//! # async fn serve() {
//! let handler = handler_fn(|message, session| async move {
//!     if let SockjsMessage::Message(text) = message {
//!         session.send(text);
//!     }
//!     Ok(())
//! });
//!
//! let endpoint = SockJsEndpoint::new(handler, EndpointConfig::default());
//! let manager = Arc::clone(endpoint.manager());
//! let app = endpoint.router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # manager.clear().await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod routing;
pub mod session;
pub mod transports;

pub use config::{
    EndpointConfig, DEFAULT_GC_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_SESSION_TIMEOUT,
    SOCKJS_CDN,
};
pub use error::{HandlerError, SessionError};
pub use manager::SessionManager;
pub use protocol::{close_frame, message_frame, messages_frame, Frame, SockjsMessage};
pub use routing::SockJsEndpoint;
pub use session::{handler_fn, RequestContext, Session, SessionHandler, SessionState};
pub use transports::Transport;
