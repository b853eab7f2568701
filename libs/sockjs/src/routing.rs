//! Endpoint URL surface: greeting, info, iframe, and transport dispatch.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Path, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{RequestPartsExt, Router};
use rand::Rng;

use crate::config::EndpointConfig;
use crate::error::TransportError;
use crate::manager::SessionManager;
use crate::protocol::{iframe_etag, iframe_html};
use crate::session::{RequestContext, SessionHandler};
use crate::transports::utils::{
    cache_headers, cors_headers, session_cookie, CACHE_CONTROL_NO_CACHE,
};
use crate::transports::{self, Transport, CONTENT_TYPE_HTML, CONTENT_TYPE_PLAIN};

/// Cap on send-transport request bodies.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub(crate) struct EndpointState {
    pub manager: Arc<SessionManager>,
    pub config: Arc<EndpointConfig>,
    pub iframe_html: Arc<String>,
    pub iframe_etag: Arc<String>,
}

/// One SockJS endpoint: a session manager plus the routes serving it.
pub struct SockJsEndpoint {
    state: EndpointState,
}

impl SockJsEndpoint {
    pub fn new(handler: Arc<dyn SessionHandler>, config: EndpointConfig) -> Self {
        let manager = SessionManager::with_intervals(
            config.name.clone(),
            handler,
            config.heartbeat_interval,
            config.session_timeout,
            config.gc_interval,
            config.debug,
        );
        let html = iframe_html(&config.sockjs_cdn);
        let etag = iframe_etag(&html);
        Self {
            state: EndpointState {
                manager,
                config: Arc::new(config),
                iframe_html: Arc::new(html),
                iframe_etag: Arc::new(etag),
            },
        }
    }

    /// The manager owning this endpoint's sessions. Drive `clear()` on it
    /// from the host's shutdown path.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.state.manager
    }

    /// Build the router carrying the full SockJS URL surface.
    pub fn router(&self) -> Router {
        let mut prefix = self.state.config.prefix.trim_end_matches('/').to_string();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }

        Router::new()
            .route(&prefix, get(greeting))
            .route(&format!("{prefix}/"), get(greeting))
            .route(&format!("{prefix}/info"), get(info).options(info_options))
            .route(&format!("{prefix}/websocket"), get(raw_websocket))
            .route(&format!("{prefix}/{{page}}"), get(page))
            .route(
                &format!("{prefix}/{{server}}/{{session}}/{{transport}}"),
                any(dispatch),
            )
            .with_state(self.state.clone())
    }
}

async fn greeting(State(state): State<EndpointState>, request_headers: HeaderMap) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_PLAIN));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_NO_CACHE),
    );
    if state.config.cookie_needed {
        headers.extend(session_cookie(&request_headers));
    }
    headers.extend(cors_headers(&request_headers));

    (StatusCode::OK, headers, "Welcome to SockJS!\n").into_response()
}

async fn info(State(state): State<EndpointState>, request_headers: HeaderMap) -> Response {
    // Entropy is sampled fresh per request so clients can seed from it.
    let entropy = rand::thread_rng().gen_range(1..=2_147_483_647i64);
    let payload = serde_json::json!({
        "entropy": entropy,
        "websocket": !state.config.disabled_transports.contains("websocket"),
        "cookie_needed": state.config.cookie_needed,
        "origins": ["*:*"],
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=UTF-8"),
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_NO_CACHE),
    );
    if state.config.cookie_needed {
        headers.extend(session_cookie(&request_headers));
    }
    headers.extend(cors_headers(&request_headers));

    (StatusCode::OK, headers, payload.to_string()).into_response()
}

async fn info_options(
    State(state): State<EndpointState>,
    request_headers: HeaderMap,
) -> Response {
    transports::options_response("OPTIONS, GET", &state, &request_headers)
}

/// Serves `iframe.html` and its versioned aliases (`iframe<ver>.html`).
async fn page(
    State(state): State<EndpointState>,
    Path(page): Path<String>,
    request_headers: HeaderMap,
) -> Response {
    if !is_iframe_page(&page) {
        return TransportError::not_found("SockJS page not found.").into_response();
    }

    if request_headers.contains_key(IF_NONE_MATCH) {
        return (StatusCode::NOT_MODIFIED, cache_headers()).into_response();
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_HTML));
    if let Ok(etag) = HeaderValue::from_str(&state.iframe_etag) {
        headers.insert(ETAG, etag);
    }
    headers.extend(cache_headers());

    (StatusCode::OK, headers, state.iframe_html.as_str().to_owned()).into_response()
}

fn is_iframe_page(page: &str) -> bool {
    let Some(rest) = page.strip_prefix("iframe") else {
        return false;
    };
    let Some(version) = rest.strip_suffix(".html") else {
        return false;
    };
    version.is_empty()
        || version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Raw WebSocket endpoint: one fresh server-generated session per accept.
async fn raw_websocket(
    State(state): State<EndpointState>,
    uri: Uri,
    request_headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.config.disabled_transports.contains("websocket") {
        return ws.on_upgrade(|mut socket| async move {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 10001,
                    reason: "".into(),
                })))
                .await;
        });
    }

    if !state.manager.started() {
        state.manager.start();
    }

    let sid = format!("{:09}", rand::thread_rng().gen_range(1..=2_147_483_647i64));
    let session = match state.manager.get_or_create(&sid) {
        Ok(session) => session,
        Err(err) => return TransportError::from(err).into_response(),
    };

    let context = RequestContext {
        method: "GET".to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or("").to_string(),
        headers: request_headers,
    };

    let manager = Arc::clone(&state.manager);
    ws.on_upgrade(move |socket| transports::rawwebsocket::run(manager, session, context, socket))
}

/// Dispatch `{server}/{session}/{transport}` to the named consumer.
async fn dispatch(
    State(state): State<EndpointState>,
    Path((server, sid, transport_id)): Path<(String, String, String)>,
    request: Request,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let Some(transport) = Transport::from_id(&transport_id) else {
        return TransportError::not_found("SockJS consumer handler not found.").into_response();
    };

    if state.config.disabled_transports.contains(transport.id()) {
        if transport == Transport::Websocket {
            if let Ok(ws) = parts.extract::<WebSocketUpgrade>().await {
                return ws.on_upgrade(|mut socket| async move {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: 10001,
                            reason: "".into(),
                        })))
                        .await;
                });
            }
        }
        return TransportError::not_found("SockJS consumer handler not found.").into_response();
    }

    if !state.manager.started() {
        state.manager.start();
    }

    if server.is_empty() || server.contains('.') || sid.is_empty() || sid.contains('.') {
        return TransportError::not_found("SockJS bad route.").into_response();
    }

    let session = if transport.autocreate() {
        match state.manager.get_or_create(&sid) {
            Ok(session) => session,
            Err(err) => return TransportError::from(err).into_response(),
        }
    } else {
        match state.manager.get(&sid) {
            Some(session) => session,
            None => {
                return TransportError::not_found("SockJS session not found.").into_response()
            }
        }
    };

    let context = RequestContext::from_parts(&parts);

    match transport {
        Transport::Websocket => match parts.extract::<WebSocketUpgrade>().await {
            Ok(ws) => transports::websocket::handle(state, context, session, ws).await,
            Err(_) => (
                StatusCode::BAD_REQUEST,
                [(CONTENT_TYPE, CONTENT_TYPE_PLAIN)],
                "Can \"Upgrade\" only to \"WebSocket\".",
            )
                .into_response(),
        },
        Transport::Xhr => transports::xhr::handle(state, context, session).await,
        Transport::XhrStreaming => {
            transports::xhr_streaming::handle(state, context, session).await
        }
        Transport::Eventsource => {
            transports::eventsource::handle(state, context, session).await
        }
        Transport::Htmlfile => transports::htmlfile::handle(state, context, session).await,
        Transport::XhrSend => match read_body(body).await {
            Ok(bytes) => transports::xhr_send::handle(state, context, session, bytes).await,
            Err(err) => err.into_response(),
        },
        Transport::Jsonp | Transport::JsonpSend => match read_body(body).await {
            Ok(bytes) => transports::jsonp::handle(state, context, session, bytes).await,
            Err(err) => err.into_response(),
        },
    }
}

async fn read_body(body: Body) -> Result<axum::body::Bytes, TransportError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| TransportError::payload("Payload expected."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iframe_page_names() {
        assert!(is_iframe_page("iframe.html"));
        assert!(is_iframe_page("iframe1-0-2.html"));
        assert!(is_iframe_page("iframe_ver.html"));
        assert!(!is_iframe_page("iframe"));
        assert!(!is_iframe_page("iframe.htm"));
        assert!(!is_iframe_page("frame.html"));
        assert!(!is_iframe_page("iframe<x>.html"));
    }
}
