//! Raw WebSocket transport: bare messages, no SockJS framing on the wire.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::manager::SessionManager;
use crate::protocol::Frame;
use crate::session::{RequestContext, Session};

pub(crate) async fn run(
    manager: Arc<SessionManager>,
    session: Arc<Session>,
    context: RequestContext,
    mut socket: WebSocket,
) {
    if let Err(err) = manager.acquire(context, &session).await {
        session.remote_close(Some(err.to_string())).await;
        session.remote_closed().await;
        let _ = socket.send(Message::Close(Some(go_away()))).await;
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    'conn: loop {
        tokio::select! {
            frame = session.wait() => {
                match frame {
                    Ok(Frame::Message(messages)) => {
                        for message in messages {
                            if ws_tx.send(Message::Text(message.into())).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Ok(Frame::MessageBlob(blob)) => {
                        // Pre-framed `a[...]`; unwrap back to bare messages.
                        let Ok(messages) =
                            serde_json::from_str::<Vec<String>>(&blob[1..])
                        else {
                            continue;
                        };
                        for message in messages {
                            if ws_tx.send(Message::Text(message.into())).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Ok(Frame::Close(..)) => {
                        let _ = ws_tx.send(Message::Close(Some(go_away()))).await;
                        session.remote_closed().await;
                        break;
                    }
                    // OPEN and HEARTBEAT never reach a raw socket.
                    Ok(_) => {}
                    Err(_) => break,
                }
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !text.is_empty() {
                            session.remote_message(text.as_str().to_owned()).await;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(text) = String::from_utf8(data.to_vec()) {
                            if !text.is_empty() {
                                session.remote_message(text).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    session.remote_closed().await;
    manager.release(&session);
}

fn go_away() -> CloseFrame {
    CloseFrame {
        code: 3000,
        reason: "Go away!".into(),
    }
}
