use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::middleware::auth::{bearer_token, decode_token};
use crate::models::Notification;
use crate::AppState;

/// User-scoped push channel: `(user_id, json message)`.
pub type BroadcastChannel = broadcast::Sender<(Uuid, String)>;

#[derive(Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

pub fn create_broadcast_channel() -> BroadcastChannel {
    broadcast::channel(256).0
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WebSocketQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| {
            tracing::warn!("WebSocket connection attempt without token");
            StatusCode::UNAUTHORIZED
        })?;

    let user = decode_token(token, &state.config.jwt_secret).ok_or_else(|| {
        tracing::warn!("WebSocket token validation failed");
        StatusCode::UNAUTHORIZED
    })?;

    tracing::info!(user_id = %user.user_id, "WebSocket connection authenticated");
    let user_id = user.user_id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.broadcast_tx.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok((target, msg)) => {
                    if target != user_id {
                        continue;
                    }
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%user_id, skipped, "WebSocket client lagging; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    tracing::debug!(%user_id, "WebSocket connection closed");
}

/// Push committed notifications to their owners' open sockets. No receivers is fine.
pub fn broadcast_notifications(channel: &BroadcastChannel, notifications: &[Notification]) {
    for notification in notifications {
        let message = serde_json::json!({
            "type": "notification",
            "data": notification,
        })
        .to_string();
        let _ = channel.send((notification.user_id, message));
    }
}
