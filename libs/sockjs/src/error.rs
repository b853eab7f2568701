//! Session and transport error types.

use std::fmt;

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Boxed error returned by application session handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by session and manager operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Another transport already holds the session.
    Acquired,
    /// The session reached its terminal state.
    Closed,
    /// The session id is not registered with the manager.
    Unknown,
    /// An expired session cannot be registered again.
    Expired,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Acquired => f.write_str("Another connection still open"),
            SessionError::Closed => f.write_str("Session is closed"),
            SessionError::Unknown => f.write_str("Unknown session"),
            SessionError::Expired => f.write_str("Can not add expired session"),
        }
    }
}

impl std::error::Error for SessionError {}

/// HTTP-facing error produced by transport and routing handlers.
///
/// Bodies are plain text, matching the wire behavior SockJS clients expect.
#[derive(Debug)]
pub struct TransportError {
    pub status: StatusCode,
    pub message: String,
    /// Extra `Access-Control-Allow-Methods` value for method rejections.
    pub allow_methods: Option<&'static str>,
}

impl TransportError {
    /// Malformed payload or missing/invalid callback parameter.
    ///
    /// SockJS clients probe these as 500s, not 400s.
    pub fn payload(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            allow_methods: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            allow_methods: None,
        }
    }

    /// 403 for a method outside the transport's allowed set.
    pub fn method_not_allowed(method: &str, allowed: &'static str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: format!("Method `{method}` is not allowed, allowed methods: {allowed}"),
            allow_methods: Some(allowed),
        }
    }

    /// 400 for a method the transport has no handling for at all.
    pub fn method_not_supported(method: &str, allowed: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("No support for such method:{{{method}}}"),
            allow_methods: Some(allowed),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            allow_methods: None,
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            [(CONTENT_TYPE, "text/plain; charset=UTF-8")],
            self.message,
        )
            .into_response();
        if let Some(allowed) = self.allow_methods {
            response.headers_mut().insert(
                "Access-Control-Allow-Methods",
                allowed.parse().expect("static method list is a valid header"),
            );
        }
        response
    }
}

impl From<SessionError> for TransportError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Unknown => TransportError::not_found("SockJS session not found."),
            other => TransportError::internal(other.to_string()),
        }
    }
}
