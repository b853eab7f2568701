//! XHR polling: one framed payload per request.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;

use super::base::{stream_session, streaming_channel, NewlineEncoder};
use super::{options_response, transport_headers, CONTENT_TYPE_JAVASCRIPT};
use crate::routing::EndpointState;
use crate::session::{RequestContext, Session};

pub(crate) async fn handle(
    state: EndpointState,
    context: RequestContext,
    session: Arc<Session>,
) -> Response {
    if context.method == "OPTIONS" {
        return options_response("OPTIONS, POST", &state, &context.headers);
    }

    let headers = transport_headers(CONTENT_TYPE_JAVASCRIPT, &state, &context.headers, true);
    let (tx, response) = streaming_channel(StatusCode::OK, headers);

    let manager = Arc::clone(&state.manager);
    tokio::spawn(async move {
        // maxsize 0: a single frame completes the poll.
        stream_session(manager, session, context, NewlineEncoder, 0, 0, tx).await;
    });

    response
}
