//! The closed set of SockJS transport consumers.

pub(crate) mod base;
pub(crate) mod eventsource;
pub(crate) mod htmlfile;
pub(crate) mod jsonp;
pub(crate) mod rawwebsocket;
pub(crate) mod utils;
pub(crate) mod websocket;
pub(crate) mod xhr;
pub(crate) mod xhr_send;
pub(crate) mod xhr_streaming;

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::routing::EndpointState;
use self::utils::{cache_headers, cors_headers, session_cookie, CACHE_CONTROL_NO_CACHE};

pub(crate) const CONTENT_TYPE_JAVASCRIPT: &str = "application/javascript; charset=UTF-8";
pub(crate) const CONTENT_TYPE_HTML: &str = "text/html; charset=UTF-8";
pub(crate) const CONTENT_TYPE_PLAIN: &str = "text/plain; charset=UTF-8";
pub(crate) const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";

/// Transport ids dispatched from the `{server}/{session}/{transport}` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Websocket,
    Xhr,
    XhrSend,
    XhrStreaming,
    Jsonp,
    JsonpSend,
    Htmlfile,
    Eventsource,
}

impl Transport {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "websocket" => Some(Self::Websocket),
            "xhr" => Some(Self::Xhr),
            "xhr_send" => Some(Self::XhrSend),
            "xhr_streaming" => Some(Self::XhrStreaming),
            "jsonp" => Some(Self::Jsonp),
            "jsonp_send" => Some(Self::JsonpSend),
            "htmlfile" => Some(Self::Htmlfile),
            "eventsource" => Some(Self::Eventsource),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Xhr => "xhr",
            Self::XhrSend => "xhr_send",
            Self::XhrStreaming => "xhr_streaming",
            Self::Jsonp => "jsonp",
            Self::JsonpSend => "jsonp_send",
            Self::Htmlfile => "htmlfile",
            Self::Eventsource => "eventsource",
        }
    }

    /// Whether a session lookup miss creates the session.
    pub fn autocreate(&self) -> bool {
        !matches!(self, Self::XhrSend | Self::JsonpSend)
    }
}

/// Common response headers for a transport: content type, no-cache, and the
/// session cookie / CORS block.
pub(crate) fn transport_headers(
    content_type: &'static str,
    state: &EndpointState,
    request_headers: &HeaderMap,
    with_cors: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_NO_CACHE),
    );
    if state.config.cookie_needed {
        headers.extend(session_cookie(request_headers));
    }
    if with_cors {
        headers.extend(cors_headers(request_headers));
    }
    headers
}

/// 204 CORS preflight with a year-long cache block.
pub(crate) fn options_response(
    allow_methods: &'static str,
    state: &EndpointState,
    request_headers: &HeaderMap,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE_JAVASCRIPT),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static(allow_methods),
    );
    if state.config.cookie_needed {
        headers.extend(session_cookie(request_headers));
    }
    headers.extend(cors_headers(request_headers));
    headers.extend(cache_headers());
    (StatusCode::NO_CONTENT, headers).into_response()
}
