use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    api::AppState,
    notify::{Hub, WsPayload, WsResponse},
};

/// Upgrade to the back-office notification channel.
pub async fn ws_endpoint(
    ws: WebSocketUpgrade,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(|socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();
    let (client_id, mut rx) = hub.register().await;

    info!(client = %client_id, "Client connected to websocket");

    let mut send_task = tokio::spawn(async move {
        let mut next = Some(WsResponse::connected());
        while let Some(response) = next.take() {
            let text = match serde_json::to_string(&response) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Failed to encode websocket response: {}", err);
                    break;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                warn!("Failed to send message to websocket: {}", e);
                break;
            }
            next = rx.recv().await;
        }
    });

    let publisher = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<WsPayload>(&text) {
                    Ok(payload) => {
                        if publisher.publish(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!("Ignoring malformed websocket payload: {}", err),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    hub.unregister(client_id).await;
    info!(client = %client_id, "WebSocket disconnected");
}
