//! Axum transport for the Chat Session Handler (spec §4.K/§6): upgrades an
//! HTTP connection to a WebSocket, reads one JSON text frame at a time, and
//! forwards the [`crate::session::process_frame`] output back to the
//! client.
//!
//! Grounded on the teacher's streaming-response idiom (background task
//! draining an async generator into a transport) re-architected from SSE
//! to `axum::extract::ws` per spec §6.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRef, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::{
    frame::{ClientFrame, ServerFrame},
    session::process_frame,
    state::ChatGatewayState,
};

/// `GET /chat/ws/chat` (no RAG) and `GET /chat/ws/rag-chat` (RAG). Generic
/// over the outer application state `S` the same way `api_routes_v1` is, so
/// `main` can `.merge()` this into a combined router.
pub fn chat_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ChatGatewayState: FromRef<S>,
{
    Router::new()
        .route("/chat/ws/chat", get(plain_chat_ws))
        .route("/chat/ws/rag-chat", get(rag_chat_ws))
}

async fn plain_chat_ws(
    State(state): State<ChatGatewayState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_session(socket, state, false))
}

async fn rag_chat_ws(State(state): State<ChatGatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_session(socket, state, true))
}

/// Drives one session end to end: INITIALIZED (the upgrade itself) →
/// accept into READY → per inbound frame, stream into STREAMING and back.
/// A peer disconnect at any point (including mid-stream) drops the
/// in-flight `process_frame` stream, cancelling whatever it was awaiting.
async fn handle_session(mut socket: WebSocket, state: ChatGatewayState, rag: bool) {
    state.metrics.inc_active_chat_sessions();

    loop {
        let Some(incoming) = socket.recv().await else {
            break;
        };
        let message = match incoming {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "websocket recv error, closing session");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(err) => {
                let error_frame = ServerFrame::Error {
                    content: format!("malformed frame: {err}"),
                };
                if send_frame(&mut socket, &error_frame).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let mut events = process_frame(state.clone(), frame, rag);
        let mut peer_closed = false;

        loop {
            tokio::select! {
                biased;

                incoming = socket.recv() => {
                    match incoming {
                        None | Some(Ok(Message::Close(_))) | Some(Err(_)) => {
                            peer_closed = true;
                            break;
                        }
                        // Any other inbound frame arriving mid-stream is
                        // ignored; the protocol is one logical turn at a
                        // time per connection.
                        Some(Ok(_)) => {}
                    }
                }
                event = events.next() => {
                    match event {
                        Some(server_frame) => {
                            if send_frame(&mut socket, &server_frame).await.is_err() {
                                peer_closed = true;
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        // Dropping `events` here (loop exit) cancels any in-flight upstream
        // work if the peer closed mid-stream, per spec §5 cancellation.
        drop(events);

        if peer_closed {
            break;
        }
    }

    state.metrics.dec_active_chat_sessions();
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "failed to serialize server frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}
