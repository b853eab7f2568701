//! Shared streaming loop for the HTTP fallback transports.
//!
//! Every streaming transport spawns [`stream_session`] to drain the session
//! queue into an `mpsc` channel wrapped as the response body. A failed
//! channel send means the client hung up, which stands in for task
//! cancellation: the session is driven through `remote_close` and
//! `remote_closed` and always released.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::protocol::{close_frame, Frame};
use crate::session::{RequestContext, Session, SessionState};

/// Response-size cap for the streaming transports: 128 KiB.
pub(crate) const DEFAULT_MAXSIZE: usize = 131072;

/// Capacity of the chunk channel between the drain task and the body.
const CHUNK_CHANNEL_CAPACITY: usize = 16;

/// Per-transport frame encoding for the streaming loop.
pub(crate) trait FrameEncoder: Send + 'static {
    fn encode(&self, payload: &str) -> Bytes;
}

/// `payload + "\n"` — XHR polling and XHR streaming.
pub(crate) struct NewlineEncoder;

impl FrameEncoder for NewlineEncoder {
    fn encode(&self, payload: &str) -> Bytes {
        Bytes::from(format!("{payload}\n"))
    }
}

/// `"data: " + payload + "\r\n\r\n"` — EventSource.
pub(crate) struct EventSourceEncoder;

impl FrameEncoder for EventSourceEncoder {
    fn encode(&self, payload: &str) -> Bytes {
        Bytes::from(format!("data: {payload}\r\n\r\n"))
    }
}

/// `<script>p(JSON)</script>` chunks — HTMLFile.
pub(crate) struct HtmlfileEncoder;

impl FrameEncoder for HtmlfileEncoder {
    fn encode(&self, payload: &str) -> Bytes {
        Bytes::from(format!(
            "<script>\np({});\n</script>\r\n",
            serde_json::json!(payload)
        ))
    }
}

/// `/**/callback(JSON);` — JSONP polling.
pub(crate) struct JsonpEncoder {
    pub callback: String,
}

impl FrameEncoder for JsonpEncoder {
    fn encode(&self, payload: &str) -> Bytes {
        Bytes::from(format!(
            "/**/{}({});\r\n",
            self.callback,
            serde_json::json!(payload)
        ))
    }
}

pub(crate) struct ChunkSender {
    tx: mpsc::Sender<Bytes>,
}

impl ChunkSender {
    pub(crate) async fn send(&self, chunk: Bytes) -> Result<(), ()> {
        self.tx.send(chunk).await.map_err(|_| ())
    }
}

/// Build a streaming response; the returned sender feeds its body.
pub(crate) fn streaming_channel(
    status: StatusCode,
    headers: HeaderMap,
) -> (ChunkSender, Response) {
    let (tx, rx) = mpsc::channel::<Bytes>(CHUNK_CHANNEL_CAPACITY);
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    let mut response = Body::from_stream(stream).into_response();
    *response.status_mut() = status;
    response.headers_mut().extend(headers);
    (ChunkSender { tx }, response)
}

/// The common acquire -> drain -> release loop.
///
/// `size` starts at `prelude_size` so transports whose prelude counts
/// toward the response cap (XHR streaming) pass its length here.
pub(crate) async fn stream_session(
    manager: Arc<SessionManager>,
    session: Arc<Session>,
    context: RequestContext,
    encoder: impl FrameEncoder,
    maxsize: usize,
    prelude_size: usize,
    tx: ChunkSender,
) {
    if session.interrupted() {
        let frame = close_frame(1002, "Connection interrupted");
        let _ = tx.send(encoder.encode(&frame)).await;
        return;
    }
    if matches!(session.state(), SessionState::Closing | SessionState::Closed) {
        session.remote_closed().await;
        let frame = close_frame(3000, "Go away!");
        let _ = tx.send(encoder.encode(&frame)).await;
        return;
    }

    match manager.acquire(context, &session).await {
        Ok(()) => {}
        Err(SessionError::Acquired) => {
            let frame = close_frame(2010, "Another connection still open");
            let _ = tx.send(encoder.encode(&frame)).await;
            return;
        }
        Err(err) => {
            tracing::warn!(session = %session.id(), error = %err, "acquire failed");
            let frame = close_frame(3000, "Go away!");
            let _ = tx.send(encoder.encode(&frame)).await;
            return;
        }
    }

    let mut size = prelude_size;
    loop {
        let frame = match session.wait().await {
            Ok(frame) => frame,
            Err(_) => break,
        };

        if matches!(frame, Frame::Close(..)) {
            session.remote_closed().await;
            let _ = tx.send(encoder.encode(&frame.pack())).await;
            break;
        }

        let chunk = encoder.encode(&frame.pack());
        size += chunk.len();
        if tx.send(chunk).await.is_err() {
            // Client hung up mid-stream.
            session
                .remote_close(Some("Connection interrupted".to_string()))
                .await;
            session.remote_closed().await;
            break;
        }
        if size >= maxsize {
            break;
        }
    }

    manager.release(&session);
}
