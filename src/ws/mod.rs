pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, RoomEvent};
use crate::types::{PlayerId, RoomId};

const MAX_WS_MESSAGE_BYTES: usize = 32 * 1024;

/// Helper to serialize and send a message over WebSocket.
/// Returns Err only when the socket itself is gone.
async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &T,
) -> Result<(), ()> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.map_err(|_| ()),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            Ok(())
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one connection: wait for `room:join`, bind to its (room, player)
/// pair, then pump room events out and commands in.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // First message must bind the session.
    let Some((room_id, player_id)) = await_join(&state, &mut sender, &mut receiver).await else {
        return;
    };

    tracing::info!("Session bound: room={} player={}", room_id, player_id);

    let mut events = state.subscribe(&room_id);

    // Mark connected; broadcasts the refreshed room to everyone,
    // including this session's just-opened subscription.
    if let Err(e) = state.update_connection(&room_id, &player_id, true).await {
        let _ = send_json(&mut sender, &error_event(&e)).await;
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(RoomEvent::Broadcast(msg)) => {
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(RoomEvent::ToPlayer { player_id: target, message }) => {
                        if target == player_id && send_json(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connection lagged, skipped {} events", skipped);
                        // Resync with a fresh snapshot.
                        if let Ok(room) = state.load(&room_id).await {
                            if send_json(&mut sender, &ServerMessage::RoomUpdate { room })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_WS_MESSAGE_BYTES {
                            let error = ServerMessage::error("MESSAGE_TOO_LARGE", "Message too large");
                            let _ = send_json(&mut sender, &error).await;
                            break;
                        }

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::JoinRoom { .. }) => {
                                let error = ServerMessage::error(
                                    "ALREADY_JOINED",
                                    "This session is already bound to a room",
                                );
                                if send_json(&mut sender, &error).await.is_err() {
                                    break;
                                }
                            }
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(&state, &room_id, &player_id, client_msg)
                                        .await
                                {
                                    if send_json(&mut sender, &response).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {e}"),
                                );
                                if send_json(&mut sender, &error).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // The seat stays allocated; peers see the disconnect.
    if let Err(e) = state.update_connection(&room_id, &player_id, false).await {
        tracing::debug!("Disconnect bookkeeping for {} failed: {}", player_id, e);
    }
    tracing::info!("Session closed: room={} player={}", room_id, player_id);
}

/// Read messages until a valid `room:join` arrives and the identity checks
/// out. Returns `None` when the socket closes first.
async fn await_join(
    state: &Arc<AppState>,
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) -> Option<(RoomId, PlayerId)> {
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(Message::Ping(data)) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    return None;
                }
                continue;
            }
            Ok(_) => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::JoinRoom { room_id, player_id }) => {
                match state.load(&room_id).await {
                    Ok(room) if room.players.contains_key(&player_id) => {
                        return Some((room_id, player_id));
                    }
                    Ok(_) => {
                        let error = error_event(&GameError::PlayerNotInRoom);
                        if send_json(sender, &error).await.is_err() {
                            return None;
                        }
                    }
                    Err(e) => {
                        let error = error_event(&e);
                        if send_json(sender, &error).await.is_err() {
                            return None;
                        }
                    }
                }
            }
            Ok(_) => {
                let error =
                    ServerMessage::error("NOT_JOINED", "Send room:join before other commands");
                if send_json(sender, &error).await.is_err() {
                    return None;
                }
            }
            Err(e) => {
                let error =
                    ServerMessage::error("PARSE_ERROR", format!("Invalid message format: {e}"));
                if send_json(sender, &error).await.is_err() {
                    return None;
                }
            }
        }
    }
    None
}

pub(crate) fn error_event(err: &GameError) -> ServerMessage {
    ServerMessage::error(err.code(), err.to_string())
}
