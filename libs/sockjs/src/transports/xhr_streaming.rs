//! XHR streaming: a long-lived response that keeps framing payloads until
//! the response-size cap.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::Response;

use super::base::{stream_session, streaming_channel, NewlineEncoder, DEFAULT_MAXSIZE};
use super::{options_response, transport_headers, CONTENT_TYPE_JAVASCRIPT};
use crate::routing::EndpointState;
use crate::session::{RequestContext, Session};

/// Browsers only expose the response once enough bytes arrived.
const PRELUDE_LEN: usize = 2048;

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
        let prelude = Bytes::from(format!("{}\n", "h".repeat(PRELUDE_LEN)));
        let prelude_size = prelude.len();
        if tx.send(prelude).await.is_err() {
            return;
        }
        stream_session(
            manager,
            session,
            context,
            NewlineEncoder,
            DEFAULT_MAXSIZE,
            prelude_size,
            tx,
        )
        .await;
    });

    response
}
