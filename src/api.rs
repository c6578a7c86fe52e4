//! Out-of-band HTTP surface: room create/join/fetch before a session
//! exists, plus liveness/readiness probes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::code::is_valid_code;
use crate::error::GameError;
use crate::state::AppState;
use crate::types::{Room, RoomSettings};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rooms/create", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/{code}", get(get_room))
        .route("/health", get(health))
        .route("/ready", get(ready))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
    display_name: Option<String>,
    settings: Option<RoomSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomRequest {
    room_code: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomCredentials {
    room_id: String,
    room_code: String,
    player_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRoomRequest>,
) -> Response {
    let Some(display_name) = body.display_name.filter(|n| !n.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "displayName is required");
    };

    match state.create_room(display_name, body.settings).await {
        Ok((room, player_id)) => Json(RoomCredentials {
            room_id: room.id,
            room_code: room.code,
            player_id,
        })
        .into_response(),
        Err(e @ GameError::InvalidInput(_)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            tracing::error!("Room creation failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn join_room(
    State(state): State<Arc<AppState>>,
    Json(body): Json<JoinRoomRequest>,
) -> Response {
    let Some(display_name) = body.display_name.filter(|n| !n.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "displayName is required");
    };
    let code = body
        .room_code
        .map(|c| c.trim().to_uppercase())
        .unwrap_or_default();
    if !is_valid_code(&code) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid room code");
    }

    match state.join_room(&code, display_name).await {
        Ok((room, player_id)) => Json(RoomCredentials {
            room_id: room.id,
            room_code: room.code,
            player_id,
        })
        .into_response(),
        Err(e @ (GameError::RoomNotFound
        | GameError::GameInProgress
        | GameError::RoomFull
        | GameError::InvalidInput(_))) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            tracing::error!("Room join failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct RoomBody {
    room: Room,
}

async fn get_room(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Response {
    let code = code.to_uppercase();
    match state.fetch_by_code(&code).await {
        Ok(room) => Json(RoomBody { room }).into_response(),
        Err(GameError::RoomNotFound) => error_response(StatusCode::NOT_FOUND, "Room not found"),
        Err(e) => {
            tracing::error!("Room fetch failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn ready(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
