//! Error taxonomy for every command the game accepts.

use shared::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GameError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GameError {
    // Validation: caller retries with corrected input
    #[error("Invalid configuration: {0}")]
    ValidationFailed(String),

    #[error("Playlist '{0}' not found")]
    PlaylistNotFound(String),

    #[error("Playlist has {available} playable tracks, {required} required")]
    InsufficientTracks { available: usize, required: usize },

    // State: not retryable for the current round
    #[error("No tracks left to play")]
    PlaylistExhausted,

    #[error("Game has not been started")]
    GameNotStarted,

    #[error("A game is already running")]
    GameAlreadyStarted,

    #[error("A round is already in progress")]
    RoundInProgress,

    #[error("No round is in progress")]
    NoActiveRound,

    #[error("Round timer has expired")]
    TimerExpired,

    #[error("Guess already submitted for this round")]
    AlreadySubmitted,

    // Session: caller discards its token and joins again
    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Player '{0}' not found")]
    PlayerNotFound(String),

    #[error("Game is full ({0} players)")]
    GameFull(usize),

    #[error("Admin privileges required")]
    Unauthorized,

    // External dependency
    #[error("Media player unavailable: {0}")]
    MediaUnavailable(String),

    #[error("Playback failed {0} times, skip or reconfigure")]
    MaxRetriesReached(u32),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl GameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            GameError::PlaylistNotFound(_) => ErrorCode::PlaylistNotFound,
            GameError::InsufficientTracks { .. } => ErrorCode::InsufficientTracks,
            GameError::PlaylistExhausted => ErrorCode::PlaylistExhausted,
            GameError::GameNotStarted => ErrorCode::GameNotStarted,
            GameError::GameAlreadyStarted => ErrorCode::GameAlreadyStarted,
            GameError::RoundInProgress => ErrorCode::RoundInProgress,
            GameError::NoActiveRound => ErrorCode::NoActiveRound,
            GameError::TimerExpired => ErrorCode::TimerExpired,
            GameError::AlreadySubmitted => ErrorCode::AlreadySubmitted,
            GameError::SessionNotFound => ErrorCode::SessionNotFound,
            GameError::SessionExpired => ErrorCode::SessionExpired,
            GameError::PlayerNotFound(_) => ErrorCode::PlayerNotFound,
            GameError::GameFull(_) => ErrorCode::GameFull,
            GameError::Unauthorized => ErrorCode::Unauthorized,
            GameError::MediaUnavailable(_) => ErrorCode::MediaUnavailable,
            GameError::MaxRetriesReached(_) => ErrorCode::MaxRetriesReached,
            GameError::InvalidMessage(_) => ErrorCode::InvalidMessage,
        }
    }

    /// HTTP status used when the error crosses the HTTP boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            GameError::ValidationFailed(_)
            | GameError::InsufficientTracks { .. }
            | GameError::InvalidMessage(_) => 400,
            GameError::Unauthorized => 403,
            GameError::PlaylistNotFound(_)
            | GameError::PlayerNotFound(_)
            | GameError::SessionNotFound => 404,
            GameError::MediaUnavailable(_) => 502,
            _ => 409,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_taxonomy() {
        assert_eq!(
            GameError::ValidationFailed("x".into()).code(),
            ErrorCode::ValidationFailed
        );
        assert_eq!(GameError::TimerExpired.code(), ErrorCode::TimerExpired);
        assert_eq!(GameError::SessionExpired.code(), ErrorCode::SessionExpired);
        assert_eq!(
            GameError::MaxRetriesReached(3).code(),
            ErrorCode::MaxRetriesReached
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(GameError::ValidationFailed("x".into()).http_status(), 400);
        assert_eq!(GameError::PlaylistNotFound("x".into()).http_status(), 404);
        assert_eq!(GameError::GameAlreadyStarted.http_status(), 409);
        assert_eq!(GameError::Unauthorized.http_status(), 403);
    }

    #[test]
    fn test_messages_are_readable() {
        let err = GameError::InsufficientTracks {
            available: 3,
            required: 10,
        };
        assert_eq!(
            err.to_string(),
            "Playlist has 3 playable tracks, 10 required"
        );
    }
}
