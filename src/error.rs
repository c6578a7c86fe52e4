use crate::imagegen::ImageGenError;
use crate::store::StoreError;

/// Result type for game service operations
pub type GameResult<T> = Result<T, GameError>;

/// The error taxonomy all layers speak. The gateway translates these into
/// unicast `error` events; the HTTP surface maps them onto status codes.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Game already in progress")]
    GameInProgress,

    #[error("Could not allocate a unique room code")]
    CodeExhaustion,

    #[error("Player is not in this room")]
    PlayerNotInRoom,

    #[error("Only the host can do this")]
    NotHost,

    #[error("At least {0} players are required")]
    NotEnoughPlayers(usize),

    #[error("All players must be ready")]
    PlayersNotReady,

    #[error("Operation {op} is not valid in the current phase")]
    InvalidPhase { op: &'static str },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Prompt rejected by content policy: {0}")]
    ContentPolicy(String),

    #[error("Image generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GameError {
    /// Stable code delivered in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RoomNotFound => "ROOM_NOT_FOUND",
            GameError::RoomFull => "ROOM_FULL",
            GameError::GameInProgress => "GAME_IN_PROGRESS",
            GameError::CodeExhaustion => "CODE_EXHAUSTION",
            GameError::PlayerNotInRoom => "PLAYER_NOT_IN_ROOM",
            GameError::NotHost => "NOT_HOST",
            GameError::NotEnoughPlayers(_) => "NOT_ENOUGH_PLAYERS",
            GameError::PlayersNotReady => "PLAYERS_NOT_READY",
            GameError::InvalidPhase { op } => invalid_phase_code(op),
            GameError::InvalidInput(_) => "VALIDATION",
            GameError::ContentPolicy(_) => "CONTENT_POLICY_VIOLATION",
            GameError::Generation(_) => "GENERATION_FAILED",
            GameError::Store(_) => "STORE_UNAVAILABLE",
        }
    }
}

/// Per-operation codes for phase violations, so clients can surface the
/// failure next to the action that triggered it.
fn invalid_phase_code(op: &str) -> &'static str {
    match op {
        "start_game" => "START_GAME_FAILED",
        "submit_prompt" => "SUBMIT_PROMPT_FAILED",
        "resubmit_prompt" => "RESUBMIT_PROMPT_FAILED",
        "select_image" => "SELECT_IMAGE_FAILED",
        "submit_guess" => "SUBMIT_GUESS_FAILED",
        "score_round" => "SCORE_ROUND_FAILED",
        "navigate_result" => "NAVIGATE_RESULT_FAILED",
        "complete_reveal" => "COMPLETE_REVEAL_FAILED",
        "next_round" => "NEXT_ROUND_FAILED",
        _ => "INVALID_PHASE",
    }
}

impl From<ImageGenError> for GameError {
    fn from(err: ImageGenError) -> Self {
        match err {
            ImageGenError::ContentPolicy(msg) => GameError::ContentPolicy(msg),
            ImageGenError::Transient(msg) => GameError::Generation(msg),
        }
    }
}
