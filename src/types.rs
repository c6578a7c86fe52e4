use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type RoomId = String;
pub type PlayerId = String;
pub type GameId = String;
pub type RoundId = String;
pub type ImageId = String;
pub type GuessId = String;

pub const DEFAULT_MAX_PLAYERS: usize = 8;
pub const MIN_PLAYERS_TO_START: usize = 2;
pub const PROMPT_MIN_CHARS: usize = 10;
pub const PROMPT_MAX_CHARS: usize = 200;
pub const GUESS_MIN_CHARS: usize = 3;
pub const GUESS_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Lobby,
    Playing,
    Finished,
}

/// Game-level phase. Mirrors the current round's phase while one is active,
/// plus the between-round and terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    PromptSubmit,
    ImageGenerate,
    ImageSelect,
    RevealGuess,
    Scoring,
    RevealResults,
    RoundEnd,
    GameEnd,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    PromptSubmit,
    ImageGenerate,
    ImageSelect,
    RevealGuess,
    Scoring,
    RevealResults,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Generating,
    Ready,
    Failed,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Queued,
    Generating,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub is_host: bool,
    pub is_ready: bool,
    pub is_connected: bool,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Player {
    pub fn new(display_name: String, is_host: bool) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string(),
            display_name,
            is_host,
            is_ready: false,
            is_connected: true,
            joined_at: now,
            last_seen_at: now,
        }
    }
}

/// Per-room game settings. Time limits are advertised to clients; the
/// server does not enforce them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    pub round_count: u32,
    pub prompt_time_limit: u32,
    pub selection_time_limit: u32,
    pub guessing_time_limit: u32,
    pub results_time_limit: u32,
    pub image_count: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            round_count: 3,
            prompt_time_limit: 90,
            selection_time_limit: 45,
            guessing_time_limit: 60,
            results_time_limit: 15,
            image_count: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub created_by: PlayerId,
    pub status: RoomStatus,
    pub host_id: PlayerId,
    pub players: HashMap<PlayerId, Player>,
    pub max_players: usize,
    pub settings: RoomSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<Game>,
}

impl Room {
    pub fn new(code: String, creator: Player, settings: RoomSettings) -> Self {
        let creator_id = creator.id.clone();
        let mut players = HashMap::new();
        players.insert(creator_id.clone(), creator);
        Self {
            id: ulid::Ulid::new().to_string(),
            code,
            created_at: Utc::now(),
            created_by: creator_id.clone(),
            status: RoomStatus::Lobby,
            host_id: creator_id,
            players,
            max_players: DEFAULT_MAX_PLAYERS,
            settings,
            game: None,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    /// The current round of the active game, if any.
    pub fn current_round(&self) -> Option<&Round> {
        self.game.as_ref().and_then(|g| g.current_round())
    }

    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.game.as_mut().and_then(|g| g.current_round_mut())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameId,
    pub room_id: RoomId,
    pub status: GamePhase,
    /// 1-indexed; equals `rounds.len()` while playing.
    pub current_round: u32,
    pub rounds: Vec<Round>,
    pub leaderboard: Leaderboard,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.rounds.last_mut()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: RoundId,
    pub round_number: u32,
    pub status: RoundPhase,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub current_reveal_index: usize,
    pub current_result_index: usize,
    pub prompts: HashMap<PlayerId, PromptSubmission>,
    pub selections: HashMap<PlayerId, ImageSelection>,
    /// Guesses per image, outer order = reveal (selection) order. Kept as a
    /// pair sequence so serialization preserves the ordering while the inner
    /// map stays keyed by guesser.
    pub guesses: Vec<(ImageId, HashMap<PlayerId, Guess>)>,
    pub bonus_points: HashMap<ImageId, u32>,
    pub scores: HashMap<PlayerId, u32>,
}

impl Round {
    pub fn new(round_number: u32) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            round_number,
            status: RoundPhase::PromptSubmit,
            started_at: Utc::now(),
            finished_at: None,
            current_reveal_index: 0,
            current_result_index: 0,
            prompts: HashMap::new(),
            selections: HashMap::new(),
            guesses: Vec::new(),
            bonus_points: HashMap::new(),
            scores: HashMap::new(),
        }
    }

    /// Selected image ids in selection order (ties broken by player id so
    /// the sequence is stable across serialization round-trips).
    pub fn reveal_sequence(&self) -> Vec<ImageId> {
        let mut selections: Vec<&ImageSelection> = self.selections.values().collect();
        selections.sort_by(|a, b| {
            a.selected_at
                .cmp(&b.selected_at)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        selections.iter().map(|s| s.image_id.clone()).collect()
    }

    /// The image currently pointed to by the reveal cursor.
    pub fn current_reveal_image(&self) -> Option<ImageId> {
        self.reveal_sequence()
            .get(self.current_reveal_index)
            .cloned()
    }

    pub fn guesses_for(&self, image_id: &str) -> Option<&HashMap<PlayerId, Guess>> {
        self.guesses
            .iter()
            .find(|(id, _)| id == image_id)
            .map(|(_, bucket)| bucket)
    }

    pub fn guesses_for_mut(&mut self, image_id: &str) -> &mut HashMap<PlayerId, Guess> {
        let index = match self.guesses.iter().position(|(id, _)| id == image_id) {
            Some(index) => index,
            None => {
                self.guesses.push((image_id.to_string(), HashMap::new()));
                self.guesses.len() - 1
            }
        };
        &mut self.guesses[index].1
    }

    /// The submitter whose prompt produced the given image.
    pub fn image_owner(&self, image_id: &str) -> Option<&PlayerId> {
        self.prompts.values().find_map(|submission| {
            submission
                .images
                .iter()
                .any(|img| img.id == image_id)
                .then_some(&submission.player_id)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSubmission {
    pub player_id: PlayerId,
    pub prompt: String,
    pub submitted_at: DateTime<Utc>,
    pub images: Vec<GeneratedImage>,
    pub status: SubmissionStatus,
}

impl PromptSubmission {
    pub fn new(player_id: PlayerId, prompt: String) -> Self {
        Self {
            player_id,
            prompt,
            submitted_at: Utc::now(),
            images: Vec::new(),
            status: SubmissionStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: ImageId,
    /// The submitter's player id (one submission per player per round).
    pub prompt_id: PlayerId,
    pub player_id: PlayerId,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_image_id: Option<String>,
    pub status: ImageStatus,
    pub generated_at: DateTime<Utc>,
    pub metadata: ImageMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    pub generation_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSelection {
    pub player_id: PlayerId,
    pub image_id: ImageId,
    pub selected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guess {
    pub id: GuessId,
    pub image_id: ImageId,
    pub player_id: PlayerId,
    pub guess_text: String,
    pub submitted_at: DateTime<Utc>,
    /// Filled during scoring; [0,100].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub scores: HashMap<PlayerId, LeaderboardEntry>,
    /// Player ids ordered by total score desc, ties by earliest join.
    pub rankings: Vec<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub total_score: u32,
    pub round_scores: Vec<u32>,
    pub guess_wins: u32,
    pub prompt_picks: u32,
}

impl LeaderboardEntry {
    pub fn new(player: &Player) -> Self {
        Self {
            player_id: player.id.clone(),
            display_name: player.display_name.clone(),
            total_score: 0,
            round_scores: Vec::new(),
            guess_wins: 0,
            prompt_picks: 0,
        }
    }
}
