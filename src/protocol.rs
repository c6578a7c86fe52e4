//! Wire protocol for the persistent session channel.

use crate::types::*;
use serde::{Deserialize, Serialize};

/// Client → server commands. One connection sends `room:join` first and is
/// then bound to its (room, player) pair for every later command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMessage {
    #[serde(rename = "room:join")]
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    #[serde(rename = "player:ready")]
    PlayerReady {
        #[serde(rename = "isReady")]
        is_ready: bool,
    },
    #[serde(rename = "game:start")]
    StartGame,
    #[serde(rename = "game:submit_prompt")]
    SubmitPrompt { prompt: String },
    #[serde(rename = "game:resubmit_prompt")]
    ResubmitPrompt { prompt: String },
    #[serde(rename = "game:select_image")]
    SelectImage {
        #[serde(rename = "imageId")]
        image_id: ImageId,
    },
    #[serde(rename = "game:submit_guess")]
    SubmitGuess {
        #[serde(rename = "imageId")]
        image_id: ImageId,
        guess: String,
    },
    #[serde(rename = "game:navigate_result")]
    NavigateResult { direction: NavigationDirection },
    #[serde(rename = "game:complete_reveal")]
    CompleteReveal,
    #[serde(rename = "game:next_round")]
    NextRound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigationDirection {
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Disconnect,
    Kicked,
    Left,
}

/// Server → client notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ServerMessage {
    #[serde(rename = "room:update")]
    RoomUpdate { room: Room },
    #[serde(rename = "player:joined")]
    PlayerJoined { player: Player },
    #[serde(rename = "player:left")]
    PlayerLeft {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        reason: LeaveReason,
        #[serde(rename = "newHostId", skip_serializing_if = "Option::is_none")]
        new_host_id: Option<PlayerId>,
    },
    #[serde(rename = "player:ready_changed")]
    PlayerReadyChanged {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(rename = "isReady")]
        is_ready: bool,
    },
    #[serde(rename = "game:started")]
    GameStarted { game: Game },
    #[serde(rename = "game:prompt_submitted")]
    PromptSubmitted {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(rename = "submittedCount")]
        submitted_count: usize,
        #[serde(rename = "playerCount")]
        player_count: usize,
    },
    /// Unicast to the rejected submitter only.
    #[serde(rename = "game:prompt_rejected")]
    PromptRejected { reason: String },
    #[serde(rename = "game:phase_transition")]
    PhaseTransition { game: Game, phase: GamePhase },
    #[serde(rename = "game:image_progress")]
    ImageProgress { game: Game },
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
            context: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_exact_wire_names() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t": "room:join", "roomId": "r1", "playerId": "p1"}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::JoinRoom { .. }));

        let json = serde_json::to_value(&ClientMessage::SubmitGuess {
            image_id: "img".to_string(),
            guess: "a blue cat".to_string(),
        })
        .unwrap();
        assert_eq!(json["t"], "game:submit_guess");
        assert_eq!(json["imageId"], "img");
    }

    #[test]
    fn server_messages_use_exact_wire_names() {
        let json = serde_json::to_value(&ServerMessage::PromptRejected {
            reason: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(json["t"], "game:prompt_rejected");

        let json = serde_json::to_value(&ServerMessage::PlayerLeft {
            player_id: "p1".to_string(),
            reason: LeaveReason::Disconnect,
            new_host_id: None,
        })
        .unwrap();
        assert_eq!(json["t"], "player:left");
        assert_eq!(json["reason"], "disconnect");
        assert!(json.get("newHostId").is_none());
    }

    #[test]
    fn navigation_direction_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t": "game:navigate_result", "direction": "previous"}"#)
                .unwrap();
        match msg {
            ClientMessage::NavigateResult { direction } => {
                assert_eq!(direction, NavigationDirection::Previous)
            }
            _ => panic!("wrong variant"),
        }
    }
}
