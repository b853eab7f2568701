//! JSONP polling: callback-wrapped GET polls plus the POST send channel.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::base::{stream_session, streaming_channel, JsonpEncoder};
use super::htmlfile::require_callback;
use super::xhr_send::{decode_body, parse_messages};
use super::{transport_headers, CONTENT_TYPE_HTML, CONTENT_TYPE_JAVASCRIPT};
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
        "GET" => poll(state, context, session).await,
        "POST" => send(state, context, session, body).await,
        other => TransportError::method_not_supported(other, "GET,POST").into_response(),
    }
}

async fn poll(state: EndpointState, context: RequestContext, session: Arc<Session>) -> Response {
    let callback = match require_callback(&context.query, &session).await {
        Ok(callback) => callback,
        Err(err) => return err.into_response(),
    };

    let headers = transport_headers(CONTENT_TYPE_JAVASCRIPT, &state, &context.headers, true);
    let (tx, response) = streaming_channel(StatusCode::OK, headers);

    let manager = Arc::clone(&state.manager);
    tokio::spawn(async move {
        // maxsize 0: every poll carries exactly one callback invocation.
        stream_session(manager, session, context, JsonpEncoder { callback }, 0, 0, tx).await;
    });

    response
}

async fn send(
    state: EndpointState,
    context: RequestContext,
    session: Arc<Session>,
    body: Bytes,
) -> Response {
    let messages = match decode_body(&context, &body).and_then(|text| parse_messages(text.as_bytes()))
    {
        Ok(messages) => messages,
        Err(err) => return err.into_response(),
    };

    let headers = transport_headers(CONTENT_TYPE_HTML, &state, &context.headers, false);
    session.remote_messages(messages).await;

    (StatusCode::OK, headers, "ok").into_response()
}
