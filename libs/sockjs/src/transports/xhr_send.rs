//! XHR send: client-to-server payload delivery for the XHR transports.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::{options_response, transport_headers, CONTENT_TYPE_PLAIN};
use crate::error::TransportError;
use crate::routing::EndpointState;
use crate::session::{RequestContext, Session};

pub(crate) async fn handle(
    state: EndpointState,
    context: RequestContext,
    session: Arc<Session>,
    body: Bytes,
) -> Response {
    match context.method.as_str() {
        "POST" => {}
        "OPTIONS" => return options_response("OPTIONS, POST", &state, &context.headers),
        other => {
            return TransportError::method_not_allowed(other, "POST, OPTIONS").into_response()
        }
    }

    let messages = match decode_body(&context, &body).and_then(|text| parse_messages(text.as_bytes()))
    {
        Ok(messages) => messages,
        Err(err) => return err.into_response(),
    };

    let headers = transport_headers(CONTENT_TYPE_PLAIN, &state, &context.headers, true);
    session.remote_messages(messages).await;

    (StatusCode::NO_CONTENT, headers).into_response()
}

/// Form-encoded bodies carry the payload as `d=<urlencoded JSON>`; anything
/// else is taken as the JSON text itself. Shared by every send transport.
pub(crate) fn decode_body(
    context: &RequestContext,
    body: &[u8],
) -> Result<String, TransportError> {
    let content_type = context
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type == "application/x-www-form-urlencoded" {
        if !body.starts_with(b"d=") {
            return Err(TransportError::payload("Payload expected."));
        }
        let decoded = form_urlencoded::parse(body)
            .find(|(key, _)| key == "d")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        if decoded.is_empty() {
            return Err(TransportError::payload("Payload expected."));
        }
        Ok(decoded)
    } else {
        let text = String::from_utf8_lossy(body).into_owned();
        if text.is_empty() {
            return Err(TransportError::payload("Payload expected."));
        }
        Ok(text)
    }
}

/// The decoded payload must be a JSON array of strings.
pub(crate) fn parse_messages(body: &[u8]) -> Result<Vec<String>, TransportError> {
    if body.is_empty() {
        return Err(TransportError::payload("Payload expected."));
    }
    serde_json::from_slice(body).map_err(|_| TransportError::payload("Broken JSON encoding."))
}
