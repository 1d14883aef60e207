use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{auth::Identity, config::Config, AppState};

use super::{events::ClientEvent, msg::Coordinator};

/// Upgrades a signed-in caller to the realtime channel.
#[debug_handler(state = AppState)]
pub async fn project_ws(
    identity: Identity,
    State(coordinator): State<Arc<Coordinator>>,
    State(config): State<Arc<Config>>,
    ws: WebSocketUpgrade,
) -> Response {
    let buffer = config.outbound_buffer;
    ws.on_upgrade(move |socket| handle_socket(socket, identity, coordinator, buffer))
}

/// One task writes queued events to the socket; this task reads client
/// events and handles them one at a time, so a connection's sends are
/// processed in the order they arrived.
async fn handle_socket(socket: WebSocket, identity: Identity, coordinator: Arc<Coordinator>, buffer: usize) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel(buffer);
    let registry = coordinator.registry().clone();
    let connection = registry.register(&identity.user_id, tx);
    tracing::info!(%connection, user_id = %identity.user_id, "socket connected");

    let mut writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(%connection, error = %err, "could not encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => coordinator.handle(connection, &identity, event).await,
                        Err(err) => tracing::warn!(%connection, error = %err, "unrecognized client event"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = &mut writer => break,
        }
    }

    registry.unregister(connection);
    writer.abort();
    tracing::info!(%connection, user_id = %identity.user_id, "socket disconnected");
}
