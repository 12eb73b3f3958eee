//! Wire protocol shared between the game server and its clients.
//!
//! Clients send `{type, id, ...payload}` commands and receive either a
//! `{type: "result", id, success, result|error}` reply or a
//! `{type: "event", event_type, data}` broadcast. All timestamps are
//! milliseconds since the Unix epoch, taken from the server clock.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MIN_TIMER_SECONDS: u32 = 10;
pub const MAX_TIMER_SECONDS: u32 = 300;
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;
pub const MAX_POINTS: i32 = 100;
pub const MAX_THRESHOLD: u32 = 50;
pub const MAX_BET_MULTIPLIER: i32 = 10;
pub const MIN_BET_PENALTY: i32 = -100;
pub const MAX_ROUNDS: u32 = 100;
pub const MAX_PLAYBACK_RETRIES: u32 = 10;
pub const MAX_NAME_LENGTH: usize = 20;

/// Lifecycle of the single game session.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    Setup,
    Lobby,
    Active,
    Results,
    Ended,
}

/// Screen a reconnecting client should resume on.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Lobby,
    ActiveRound,
    Results,
}

impl From<GameState> for View {
    fn from(state: GameState) -> Self {
        match state {
            GameState::Active => View::ActiveRound,
            GameState::Results | GameState::Ended => View::Results,
            GameState::Setup | GameState::Lobby => View::Lobby,
        }
    }
}

/// Settings chosen by the host when starting a game.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub timer_duration: u32,
    pub year_range: (i32, i32),
    pub exact_points: i32,
    pub close_points: i32,
    pub near_points: i32,
    pub close_threshold: u32,
    pub near_threshold: u32,
    pub bet_multiplier: i32,
    /// Points applied when a bet was placed on a guess that scored nothing.
    pub bet_penalty: i32,
    pub rounds: Option<u32>,
    pub max_playback_retries: u32,
    pub media_player: String,
    pub playlist: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            timer_duration: 30,
            year_range: (1950, 2029),
            exact_points: 10,
            close_points: 5,
            near_points: 1,
            close_threshold: 3,
            near_threshold: 5,
            bet_multiplier: 2,
            bet_penalty: -5,
            rounds: None,
            max_playback_retries: 3,
            media_player: String::new(),
            playlist: String::new(),
        }
    }
}

impl GameConfig {
    /// Checks every numeric field against its allowed range.
    ///
    /// Returns a human readable description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_TIMER_SECONDS..=MAX_TIMER_SECONDS).contains(&self.timer_duration) {
            return Err(format!(
                "timer_duration must be between {} and {} seconds",
                MIN_TIMER_SECONDS, MAX_TIMER_SECONDS
            ));
        }

        let (start, end) = self.year_range;
        if start < MIN_YEAR || end > MAX_YEAR || start > end {
            return Err(format!(
                "year_range must satisfy {} <= start <= end <= {}",
                MIN_YEAR, MAX_YEAR
            ));
        }

        if self.near_points < 0
            || self.near_points > self.close_points
            || self.close_points > self.exact_points
            || self.exact_points > MAX_POINTS
        {
            return Err(format!(
                "points must satisfy 0 <= near <= close <= exact <= {}",
                MAX_POINTS
            ));
        }

        if self.close_threshold < 1
            || self.close_threshold > self.near_threshold
            || self.near_threshold > MAX_THRESHOLD
        {
            return Err(format!(
                "thresholds must satisfy 1 <= close <= near <= {}",
                MAX_THRESHOLD
            ));
        }

        if !(1..=MAX_BET_MULTIPLIER).contains(&self.bet_multiplier) {
            return Err(format!(
                "bet_multiplier must be between 1 and {}",
                MAX_BET_MULTIPLIER
            ));
        }

        if !(MIN_BET_PENALTY..=0).contains(&self.bet_penalty) {
            return Err(format!(
                "bet_penalty must be between {} and 0",
                MIN_BET_PENALTY
            ));
        }

        if let Some(rounds) = self.rounds {
            if !(1..=MAX_ROUNDS).contains(&rounds) {
                return Err(format!("rounds must be between 1 and {}", MAX_ROUNDS));
            }
        }

        if self.max_playback_retries > MAX_PLAYBACK_RETRIES {
            return Err(format!(
                "max_playback_retries must be at most {}",
                MAX_PLAYBACK_RETRIES
            ));
        }

        if self.playlist.trim().is_empty() {
            return Err("a playlist must be selected".to_string());
        }

        if self.media_player.trim().is_empty() {
            return Err("a media player must be selected".to_string());
        }

        Ok(())
    }

    pub fn year_in_range(&self, year: i32) -> bool {
        self.year_range.0 <= year && year <= self.year_range.1
    }
}

/// Stable machine readable error codes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationFailed,
    PlaylistNotFound,
    InsufficientTracks,
    PlaylistExhausted,
    GameNotStarted,
    GameAlreadyStarted,
    RoundInProgress,
    NoActiveRound,
    TimerExpired,
    AlreadySubmitted,
    SessionNotFound,
    SessionExpired,
    PlayerNotFound,
    GameFull,
    Unauthorized,
    MediaUnavailable,
    MaxRetriesReached,
    InvalidMessage,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::PlaylistNotFound => "playlist_not_found",
            ErrorCode::InsufficientTracks => "insufficient_tracks",
            ErrorCode::PlaylistExhausted => "playlist_exhausted",
            ErrorCode::GameNotStarted => "game_not_started",
            ErrorCode::GameAlreadyStarted => "game_already_started",
            ErrorCode::RoundInProgress => "round_in_progress",
            ErrorCode::NoActiveRound => "no_active_round",
            ErrorCode::TimerExpired => "timer_expired",
            ErrorCode::AlreadySubmitted => "already_submitted",
            ErrorCode::SessionNotFound => "session_not_found",
            ErrorCode::SessionExpired => "session_expired",
            ErrorCode::PlayerNotFound => "player_not_found",
            ErrorCode::GameFull => "game_full",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::MediaUnavailable => "media_unavailable",
            ErrorCode::MaxRetriesReached => "max_retries_reached",
            ErrorCode::InvalidMessage => "invalid_message",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Inbound command: `{type, id, ...payload}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandEnvelope {
    pub id: Value,
    #[serde(flatten)]
    pub command: ClientCommand,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinGame {
        name: String,
        #[serde(default)]
        is_admin: bool,
    },
    Reconnect {
        session_id: String,
        player_name: String,
    },
    SubmitGuess {
        player_name: String,
        year_guess: i32,
        #[serde(default)]
        bet_placed: bool,
        /// Client's own clock; informational only.
        #[serde(default)]
        submitted_at: Option<u64>,
    },
    PlaceBet {
        player_name: String,
        bet_active: bool,
    },
    NextSong {
        #[serde(default)]
        admin_key: Option<String>,
    },
    SkipSong {
        #[serde(default)]
        admin_key: Option<String>,
    },
    ResetGame {
        #[serde(default)]
        admin_key: Option<String>,
    },
    ControlMedia {
        action: MediaAction,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        admin_key: Option<String>,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::JoinGame { .. } => "join_game",
            ClientCommand::Reconnect { .. } => "reconnect",
            ClientCommand::SubmitGuess { .. } => "submit_guess",
            ClientCommand::PlaceBet { .. } => "place_bet",
            ClientCommand::NextSong { .. } => "next_song",
            ClientCommand::SkipSong { .. } => "skip_song",
            ClientCommand::ResetGame { .. } => "reset_game",
            ClientCommand::ControlMedia { .. } => "control_media",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaAction {
    Play,
    Pause,
    Resume,
    Stop,
    Retry,
}

/// Everything the server writes to a socket.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Result(CommandReply),
    Event(GameEvent),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommandReply {
    pub id: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorBody>,
}

impl CommandReply {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Song details safe to show while a round is running.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SongView {
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
}

/// Song details revealed once a round has been settled.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RevealedSong {
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    pub year: i32,
    pub trivia: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerView {
    pub name: String,
    pub is_admin: bool,
    pub total_score: i64,
    pub connected: bool,
}

/// The caller's own identity, including its reconnection token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionPlayer {
    pub session_id: String,
    pub player_name: String,
    pub is_admin: bool,
    pub total_score: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoundResult {
    pub player_name: String,
    pub year_guess: Option<i32>,
    pub bet_placed: bool,
    pub years_off: Option<u32>,
    pub points_earned: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub player_name: String,
    pub total_points: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JoinResult {
    pub success: bool,
    pub session_id: String,
    pub player_name: String,
    pub name_adjusted: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_name: Option<String>,
    pub is_admin: bool,
    pub players: Vec<PlayerView>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActiveRoundData {
    pub round_number: u32,
    pub song: SongView,
    pub started_at: u64,
    pub timer_duration: u32,
    pub remaining_seconds: u32,
    pub server_now: u64,
    pub year_range: (i32, i32),
    pub has_submitted: bool,
    pub bet_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResultsData {
    pub round_number: u32,
    pub song: RevealedSong,
    pub correct_year: i32,
    pub results: Vec<RoundResult>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RoundData {
    Active(ActiveRoundData),
    Results(ResultsData),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReconnectResult {
    pub success: bool,
    pub player: SessionPlayer,
    pub game_state: GameState,
    pub current_view: View,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub round_data: Option<RoundData>,
    pub players: Vec<PlayerView>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    PlaylistExhausted,
    RoundLimitReached,
}

/// Every broadcast the server can emit.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted {
        playlist: String,
        timer_duration: u32,
        year_range: (i32, i32),
        tracks_available: usize,
    },
    PlayerJoined {
        player_name: String,
        total_players: usize,
    },
    PlayerStatus {
        player_name: String,
        connected: bool,
        total_players: usize,
    },
    RoundStarted {
        song: SongView,
        timer_duration: u32,
        started_at: u64,
        round_number: u32,
        year_range: (i32, i32),
    },
    GuessSubmitted {
        player_name: String,
        submitted_count: usize,
        total_players: usize,
    },
    BetPlaced {
        player_name: String,
        bet_active: bool,
    },
    RoundEnded {
        round_number: u32,
        correct_year: i32,
        song: RevealedSong,
        results: Vec<RoundResult>,
        leaderboard: Vec<LeaderboardEntry>,
    },
    GameEnded {
        reason: EndReason,
        leaderboard: Vec<LeaderboardEntry>,
    },
    GameReset {
        message: String,
    },
    PlaybackError {
        track_title: String,
        track_artist: String,
        error_message: String,
        retry_count: u32,
        max_retries: u32,
        can_retry: bool,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::GameStarted { .. } => "game_started",
            GameEvent::PlayerJoined { .. } => "player_joined",
            GameEvent::PlayerStatus { .. } => "player_status",
            GameEvent::RoundStarted { .. } => "round_started",
            GameEvent::GuessSubmitted { .. } => "guess_submitted",
            GameEvent::BetPlaced { .. } => "bet_placed",
            GameEvent::RoundEnded { .. } => "round_ended",
            GameEvent::GameEnded { .. } => "game_ended",
            GameEvent::GameReset { .. } => "game_reset",
            GameEvent::PlaybackError { .. } => "playback_error",
        }
    }
}
