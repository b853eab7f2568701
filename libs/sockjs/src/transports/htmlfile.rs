//! Chunked-HTML transport for browsers without XHR streaming.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::base::{stream_session, streaming_channel, HtmlfileEncoder, DEFAULT_MAXSIZE};
use super::utils::{query_param, valid_callback};
use super::{transport_headers, CONTENT_TYPE_HTML};
use crate::error::TransportError;
use crate::protocol::htmlfile_page;
use crate::routing::EndpointState;
use crate::session::{RequestContext, Session};

pub(crate) async fn handle(
    state: EndpointState,
    context: RequestContext,
    session: Arc<Session>,
) -> Response {
    let callback = match require_callback(&context.query, &session).await {
        Ok(callback) => callback,
        Err(err) => return err.into_response(),
    };

    let headers = transport_headers(CONTENT_TYPE_HTML, &state, &context.headers, true);
    let (tx, response) = streaming_channel(StatusCode::OK, headers);

    let manager = Arc::clone(&state.manager);
    tokio::spawn(async move {
        let prelude = Bytes::from(htmlfile_page(&callback));
        if tx.send(prelude).await.is_err() {
            return;
        }
        stream_session(
            manager,
            session,
            context,
            HtmlfileEncoder,
            DEFAULT_MAXSIZE,
            0,
            tx,
        )
        .await;
    });

    response
}

/// Validate the `c` query parameter; failures tear down the bound session.
pub(crate) async fn require_callback(
    query: &str,
    session: &Arc<Session>,
) -> Result<String, TransportError> {
    match query_param(query, "c") {
        None => {
            session.remote_closed().await;
            Err(TransportError::payload("\"callback\" parameter required"))
        }
        Some(callback) if !valid_callback(&callback) => {
            session.remote_closed().await;
            Err(TransportError::payload("invalid \"callback\" parameter"))
        }
        Some(callback) => Ok(callback),
    }
}
