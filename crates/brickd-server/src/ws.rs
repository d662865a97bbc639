//! WebSocket endpoint.
//!
//! One reader/writer pair per client: the reader feeds inbound text frames
//! to the dispatcher, the writer drains the session's outbound channel into
//! the socket. Either side ending unregisters the session; nothing else in
//! the system notices a client going away.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use brickd_core::{OutboundEnvelope, protocol};

use crate::app::App;
use crate::sessions::SESSION_CHANNEL_CAPACITY;

pub async fn ws_handler(State(app): State<Arc<App>>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(app, socket))
}

async fn handle_socket(app: Arc<App>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(SESSION_CHANNEL_CAPACITY);
    let id = app.sessions.connect(tx);

    // Tell the client which session it is, through the ordinary queue.
    app.outbox.push(OutboundEnvelope::unicast(id, protocol::session_id_frame(id)));

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => app.dispatcher.dispatch(id, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum itself; binary frames are not part
            // of the protocol.
            Ok(_) => {}
            Err(e) => {
                debug!(session = %id, error = %e, "websocket read failed");
                break;
            }
        }
    }

    app.sessions.disconnect(id);
    writer.abort();
}
