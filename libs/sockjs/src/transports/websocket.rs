//! SockJS-framed WebSocket transport.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};

use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::protocol::{close_frame, Frame};
use crate::routing::EndpointState;
use crate::session::{RequestContext, Session, SessionState};

pub(crate) async fn handle(
    state: EndpointState,
    context: RequestContext,
    session: Arc<Session>,
    ws: WebSocketUpgrade,
) -> Response {
    let manager = Arc::clone(&state.manager);
    ws.on_upgrade(move |socket| run(manager, session, context, socket))
}

async fn run(
    manager: Arc<SessionManager>,
    session: Arc<Session>,
    context: RequestContext,
    mut socket: WebSocket,
) {
    if session.interrupted() {
        let frame = close_frame(1002, "Connection interrupted");
        let _ = socket.send(Message::Text(frame.into())).await;
        return;
    }
    if matches!(
        session.state(),
        SessionState::Closing | SessionState::Closed
    ) {
        session.remote_closed().await;
        let frame = close_frame(3000, "Go away!");
        let _ = socket.send(Message::Text(frame.into())).await;
        return;
    }

    match manager.acquire(context, &session).await {
        Ok(()) => {}
        Err(SessionError::Acquired) => {
            let frame = close_frame(2010, "Another connection still open");
            let _ = socket.send(Message::Text(frame.into())).await;
            return;
        }
        Err(err) => {
            session.remote_close(Some(err.to_string())).await;
            session.remote_closed().await;
            let frame = close_frame(3000, "Go away!");
            let _ = socket.send(Message::Text(frame.into())).await;
            let _ = socket.send(Message::Close(Some(go_away()))).await;
            return;
        }
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            frame = session.wait() => {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(_) => break,
                };
                let is_close = matches!(frame, Frame::Close(..));
                if ws_tx.send(Message::Text(frame.pack().into())).await.is_err() {
                    break;
                }
                if is_close {
                    let _ = ws_tx.send(Message::Close(Some(go_away()))).await;
                    session.remote_closed().await;
                    break;
                }
            }

            incoming = ws_rx.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => Ok(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => {
                        String::from_utf8(data.to_vec()).map_err(|_| ())
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };

                let delivered = match text {
                    Ok(text) => deliver(&session, &text).await,
                    Err(()) => Err(()),
                };
                if delivered.is_err() {
                    session
                        .remote_close(Some("Broken framing".to_string()))
                        .await;
                    session.remote_closed().await;
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    session.remote_closed().await;
    manager.release(&session);
}

/// SockJS frames a single message either as a bare JSON string or as a
/// one-element array; both shapes decode to one `remote_message`.
async fn deliver(session: &Arc<Session>, text: &str) -> Result<(), ()> {
    let payload = if let Some(inner) = text.strip_prefix('[') {
        inner.strip_suffix(']').unwrap_or(inner)
    } else {
        text
    };

    let message: String = serde_json::from_str(payload).map_err(|_| ())?;
    session.remote_message(message).await;
    Ok(())
}

fn go_away() -> CloseFrame {
    CloseFrame {
        code: 3000,
        reason: "Go away!".into(),
    }
}
