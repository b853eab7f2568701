//! Server-sent events transport.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::Response;

use super::base::{stream_session, streaming_channel, EventSourceEncoder, DEFAULT_MAXSIZE};
use super::{transport_headers, CONTENT_TYPE_EVENT_STREAM};
use crate::routing::EndpointState;
use crate::session::{RequestContext, Session};

pub(crate) async fn handle(
    state: EndpointState,
    context: RequestContext,
    session: Arc<Session>,
) -> Response {
    let headers = transport_headers(CONTENT_TYPE_EVENT_STREAM, &state, &context.headers, false);
    let (tx, response) = streaming_channel(StatusCode::OK, headers);

    let manager = Arc::clone(&state.manager);
    tokio::spawn(async move {
        if tx.send(Bytes::from_static(b"\r\n")).await.is_err() {
            return;
        }
        stream_session(
            manager,
            session,
            context,
            EventSourceEncoder,
            DEFAULT_MAXSIZE,
            0,
            tx,
        )
        .await;
    });

    response
}
