//! The game session and its round state machine.
//!
//! `SETUP -> LOBBY -> ACTIVE -> RESULTS -> ACTIVE -> ... -> ENDED`, with
//! `reset` returning any state to a fresh `SETUP`. Every mutating method
//! returns the event that describes the change; the caller broadcasts it
//! only after the method has returned, so observers never see an event for
//! a change that did not happen.

use crate::error::{GameError, Result};
use crate::playlist::{Playlist, Track};
use crate::registry::{JoinOutcome, SessionRegistry};
use crate::round::{Guess, Round};
use crate::scoring;
use crate::utils::generate_token;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use shared::{
    EndReason, GameConfig, GameEvent, GameState, LeaderboardEntry, PlayerView, MAX_YEAR,
    MIN_YEAR,
};
use std::time::Duration;

/// Outcome of asking for the next round
#[derive(Debug, Clone, PartialEq)]
pub enum RoundAdvance {
    Started {
        round_number: u32,
        track: Track,
        event: GameEvent,
    },
    /// No round could be started; the game is now over
    Ended { reason: EndReason, event: GameEvent },
}

impl RoundAdvance {
    pub fn event(&self) -> &GameEvent {
        match self {
            RoundAdvance::Started { event, .. } | RoundAdvance::Ended { event, .. } => event,
        }
    }
}

/// Snapshot served by `GET /game_status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStatus {
    pub state: GameState,
    pub round_number: u32,
    pub rounds_played: usize,
    pub tracks_remaining: usize,
    pub total_players: usize,
    /// Players with at least one open socket
    pub connected_players: usize,
    pub players: Vec<PlayerView>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

pub struct GameSession {
    pub(crate) state: GameState,
    pub(crate) config: Option<GameConfig>,
    admin_key: Option<String>,
    pub(crate) registry: SessionRegistry,
    pub(crate) current_round: Option<Round>,
    pub(crate) round_history: Vec<Round>,
    /// Unplayed tracks in play order, next track at the end
    deck: Vec<Track>,
    /// Bumped on every reset so late async results can be recognised
    generation: u64,
    rng: StdRng,
    max_players: usize,
    session_ttl: Duration,
}

impl GameSession {
    pub fn new(max_players: usize, session_ttl: Duration) -> Self {
        Self::with_rng(max_players, session_ttl, StdRng::from_entropy())
    }

    pub fn with_rng(max_players: usize, session_ttl: Duration, rng: StdRng) -> Self {
        Self {
            state: GameState::Setup,
            config: None,
            admin_key: None,
            registry: SessionRegistry::new(max_players, session_ttl),
            current_round: None,
            round_history: Vec::new(),
            deck: Vec::new(),
            generation: 0,
            rng,
            max_players,
            session_ttl,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn config(&self) -> Option<&GameConfig> {
        self.config.as_ref()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current_round.as_ref()
    }

    pub fn last_settled_round(&self) -> Option<&Round> {
        self.round_history.last()
    }

    pub fn tracks_remaining(&self) -> usize {
        self.deck.len()
    }

    pub fn media_player(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.media_player.as_str())
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        scoring::leaderboard(self.registry.scores())
    }

    /// SETUP -> LOBBY. Returns the admin key and the `game_started` event.
    pub fn start_game(
        &mut self,
        config: GameConfig,
        playlist: Option<&Playlist>,
        media_players: &[String],
    ) -> Result<(String, GameEvent)> {
        if self.state != GameState::Setup {
            return Err(GameError::GameAlreadyStarted);
        }

        config.validate().map_err(GameError::ValidationFailed)?;

        if !media_players.iter().any(|p| *p == config.media_player) {
            return Err(GameError::ValidationFailed(format!(
                "unknown media player '{}'",
                config.media_player
            )));
        }

        let playlist = playlist.ok_or_else(|| GameError::PlaylistNotFound(config.playlist.clone()))?;

        let mut deck = playlist.tracks_in_range(&config);
        let required = config.rounds.unwrap_or(1) as usize;
        if deck.len() < required {
            return Err(GameError::InsufficientTracks {
                available: deck.len(),
                required,
            });
        }
        deck.shuffle(&mut self.rng);

        let admin_key = generate_token(&mut self.rng);
        let event = GameEvent::GameStarted {
            playlist: playlist.name.clone(),
            timer_duration: config.timer_duration,
            year_range: config.year_range,
            tracks_available: deck.len(),
        };

        info!(
            "Game started with playlist '{}' ({} tracks in {:?})",
            playlist.name,
            deck.len(),
            config.year_range
        );

        self.deck = deck;
        self.config = Some(config);
        self.admin_key = Some(admin_key.clone());
        self.state = GameState::Lobby;

        Ok((admin_key, event))
    }

    pub fn join(&mut self, name: &str, is_admin: bool, now: u64) -> Result<(JoinOutcome, GameEvent)> {
        if self.state == GameState::Setup {
            return Err(GameError::GameNotStarted);
        }

        let outcome = self.registry.join(name, is_admin, now, &mut self.rng)?;
        let event = GameEvent::PlayerJoined {
            player_name: outcome.player_name.clone(),
            total_players: self.registry.len(),
        };

        Ok((outcome, event))
    }

    /// LOBBY/RESULTS -> ACTIVE, or -> ENDED when nothing is left to play
    pub fn next_round(&mut self, now: u64) -> Result<RoundAdvance> {
        match self.state {
            GameState::Setup => Err(GameError::GameNotStarted),
            GameState::Active => Err(GameError::RoundInProgress),
            GameState::Ended => Err(GameError::PlaylistExhausted),
            GameState::Lobby | GameState::Results => self.advance(now),
        }
    }

    /// Admin skip: settles a running round first, then advances.
    ///
    /// Returns the `round_ended` event when a round was cut short.
    pub fn skip_round(&mut self, now: u64) -> Result<(Option<GameEvent>, RoundAdvance)> {
        match self.state {
            GameState::Setup => Err(GameError::GameNotStarted),
            GameState::Ended => Err(GameError::PlaylistExhausted),
            GameState::Active => {
                let ended = self.settle_round()?;
                Ok((Some(ended), self.advance(now)?))
            }
            GameState::Lobby | GameState::Results => Ok((None, self.advance(now)?)),
        }
    }

    fn advance(&mut self, now: u64) -> Result<RoundAdvance> {
        let config = self.config.as_ref().ok_or(GameError::GameNotStarted)?;

        let limit_reached = config
            .rounds
            .is_some_and(|rounds| self.round_history.len() >= rounds as usize);
        if limit_reached {
            return Ok(self.end_game(EndReason::RoundLimitReached));
        }

        let Some(track) = self.deck.pop() else {
            return Ok(self.end_game(EndReason::PlaylistExhausted));
        };

        let round_number = self.round_history.len() as u32 + 1;
        let event = GameEvent::RoundStarted {
            song: track.teaser(),
            timer_duration: config.timer_duration,
            started_at: now,
            round_number,
            year_range: config.year_range,
        };

        info!(
            "Round {} started: '{}' by {} ({} tracks left)",
            round_number,
            track.title,
            track.artist,
            self.deck.len()
        );

        self.registry.clear_bets();
        self.current_round = Some(Round::new(
            round_number,
            track.clone(),
            now,
            config.timer_duration,
        ));
        self.state = GameState::Active;

        Ok(RoundAdvance::Started {
            round_number,
            track,
            event,
        })
    }

    fn end_game(&mut self, reason: EndReason) -> RoundAdvance {
        info!("Game ended: {:?}", reason);
        self.state = GameState::Ended;
        self.current_round = None;

        RoundAdvance::Ended {
            reason,
            event: GameEvent::GameEnded {
                reason,
                leaderboard: self.leaderboard(),
            },
        }
    }

    /// ACTIVE -> RESULTS. Scores every guess and moves the round to history.
    pub fn settle_round(&mut self) -> Result<GameEvent> {
        if self.state != GameState::Active {
            return Err(GameError::NoActiveRound);
        }
        let config = self.config.as_ref().ok_or(GameError::GameNotStarted)?;
        let mut round = self.current_round.take().ok_or(GameError::NoActiveRound)?;

        let names: Vec<String> = self.registry.players().map(|p| p.name.clone()).collect();
        let results = round
            .settle(config, names.iter().map(String::as_str))
            .to_vec();

        for result in &results {
            self.registry.add_points(&result.player_name, result.points_earned);
        }

        let leaderboard = self.leaderboard();
        info!(
            "Round {} settled: {} guesses, correct year {}",
            round.round_number,
            round.guesses.len(),
            round.track.year
        );

        let event = GameEvent::RoundEnded {
            round_number: round.round_number,
            correct_year: round.track.year,
            song: round.track.revealed(),
            results,
            leaderboard,
        };

        self.round_history.push(round);
        self.state = GameState::Results;

        Ok(event)
    }

    /// Settles the running round once the server clock passes its deadline
    pub fn expire_round_if_due(&mut self, now: u64) -> Option<GameEvent> {
        let due = self.state == GameState::Active
            && self
                .current_round
                .as_ref()
                .is_some_and(|round| round.timer.is_expired(now));

        if due {
            self.settle_round().ok()
        } else {
            None
        }
    }

    pub fn submit_guess(
        &mut self,
        player_name: &str,
        year_guess: i32,
        bet_placed: bool,
        client_submitted_at: Option<u64>,
        now: u64,
    ) -> Result<GameEvent> {
        self.require_round_open(now)?;
        self.registry.get(player_name)?;

        if !(MIN_YEAR..=MAX_YEAR).contains(&year_guess) {
            return Err(GameError::ValidationFailed(format!(
                "year_guess must be between {} and {}",
                MIN_YEAR, MAX_YEAR
            )));
        }

        let round = self.current_round.as_mut().ok_or(GameError::NoActiveRound)?;
        round.submit(
            player_name,
            Guess {
                year_guess,
                bet_placed,
                submitted_at: now,
                client_submitted_at,
            },
        )?;
        let submitted_count = round.guesses.len();

        let player = self.registry.get_mut(player_name)?;
        player.bet_active = bet_placed;
        player.last_seen_at = now;

        Ok(GameEvent::GuessSubmitted {
            player_name: player_name.to_string(),
            submitted_count,
            total_players: self.registry.len(),
        })
    }

    pub fn place_bet(&mut self, player_name: &str, bet_active: bool, now: u64) -> Result<GameEvent> {
        self.require_round_open(now)?;

        let already_guessed = self
            .current_round
            .as_ref()
            .is_some_and(|round| round.has_submitted(player_name));

        let player = self.registry.get_mut(player_name)?;
        if already_guessed {
            return Err(GameError::AlreadySubmitted);
        }
        player.bet_active = bet_active;
        player.last_seen_at = now;

        Ok(GameEvent::BetPlaced {
            player_name: player_name.to_string(),
            bet_active,
        })
    }

    fn require_round_open(&self, now: u64) -> Result<()> {
        match self.state {
            GameState::Setup => Err(GameError::GameNotStarted),
            GameState::Lobby => Err(GameError::NoActiveRound),
            GameState::Results | GameState::Ended => Err(GameError::TimerExpired),
            GameState::Active => match &self.current_round {
                Some(round) if round.timer.is_expired(now) => Err(GameError::TimerExpired),
                Some(_) => Ok(()),
                None => Err(GameError::NoActiveRound),
            },
        }
    }

    /// Any state -> fresh SETUP. Players, rounds and the admin key are dropped.
    pub fn reset(&mut self) -> GameEvent {
        let generation = self.generation + 1;
        let rng = StdRng::from_rng(&mut self.rng).unwrap_or_else(|_| StdRng::from_entropy());

        *self = Self::with_rng(self.max_players, self.session_ttl, rng);
        self.generation = generation;
        info!("Game reset (generation {})", generation);

        GameEvent::GameReset {
            message: "The game has been reset by the host".to_string(),
        }
    }

    /// Privileged commands pass with any one of: an admin-bound connection,
    /// the admin key, or the admin player's session token.
    pub fn is_authorized_admin(
        &self,
        bound_player: Option<&str>,
        admin_key: Option<&str>,
        session_id: Option<&str>,
    ) -> bool {
        let bound_admin = bound_player
            .and_then(|name| self.registry.get(name).ok())
            .is_some_and(|p| p.is_admin);
        let key_matches = matches!(
            (admin_key, self.admin_key.as_deref()),
            (Some(given), Some(expected)) if given == expected
        );
        let token_is_admin = session_id
            .and_then(|token| self.registry.find_by_token_only(token))
            .is_some_and(|p| p.is_admin);

        bound_admin || key_matches || token_is_admin
    }

    pub fn admin_key_matches(&self, admin_key: Option<&str>) -> bool {
        self.is_authorized_admin(None, admin_key, None)
    }

    /// Counts a failed `play` against the running round.
    ///
    /// Results for another game generation or another round are ignored.
    pub fn record_playback_failure(
        &mut self,
        generation: u64,
        round_number: Option<u32>,
        error_message: &str,
    ) -> Option<GameEvent> {
        if generation != self.generation || self.state != GameState::Active {
            return None;
        }
        let max_retries = self.config.as_ref()?.max_playback_retries;
        let round = self.current_round.as_mut()?;
        if Some(round.round_number) != round_number {
            return None;
        }

        round.playback_failures += 1;
        Some(GameEvent::PlaybackError {
            track_title: round.track.title.clone(),
            track_artist: round.track.artist.clone(),
            error_message: error_message.to_string(),
            retry_count: round.playback_failures,
            max_retries,
            can_retry: round.playback_failures < max_retries,
        })
    }

    /// Track to re-play for an operator retry, while retries remain
    pub fn retry_playback(&self) -> Result<Track> {
        let config = self.config.as_ref().ok_or(GameError::GameNotStarted)?;
        let round = match (self.state, &self.current_round) {
            (GameState::Active, Some(round)) => round,
            _ => return Err(GameError::NoActiveRound),
        };

        if round.playback_failures >= config.max_playback_retries {
            return Err(GameError::MaxRetriesReached(round.playback_failures));
        }
        Ok(round.track.clone())
    }

    pub fn status(&self) -> GameStatus {
        let round_number = self
            .current_round
            .as_ref()
            .or(self.round_history.last())
            .map_or(0, |r| r.round_number);

        GameStatus {
            state: self.state,
            round_number,
            rounds_played: self.round_history.len(),
            tracks_remaining: self.deck.len(),
            total_players: self.registry.len(),
            connected_players: self.registry.connected_count(),
            players: self.registry.views(),
            leaderboard: self.leaderboard(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::DEFAULT_SESSION_TTL;
    use tokio_test::assert_ok;

    pub(crate) const T0: u64 = 1_700_000_000_000;
    pub(crate) const PLAYER: &str = "media_player.living_room";

    pub(crate) fn eighties(count: usize) -> Playlist {
        Playlist {
            id: "eighties".to_string(),
            name: "Eighties".to_string(),
            tracks: (0..count)
                .map(|i| Track {
                    title: format!("Song {}", i),
                    artist: format!("Artist {}", i),
                    year: 1986,
                    uri: format!("media://{}", i),
                    cover_url: None,
                    trivia: None,
                })
                .collect(),
        }
    }

    pub(crate) fn config() -> GameConfig {
        GameConfig {
            timer_duration: 30,
            year_range: (1980, 1989),
            exact_points: 10,
            bet_multiplier: 2,
            playlist: "eighties".to_string(),
            media_player: PLAYER.to_string(),
            ..GameConfig::default()
        }
    }

    pub(crate) fn started_session() -> GameSession {
        let mut session =
            GameSession::with_rng(20, DEFAULT_SESSION_TTL, StdRng::seed_from_u64(1));
        session
            .start_game(config(), Some(&eighties(20)), &[PLAYER.to_string()])
            .unwrap();
        session
    }

    #[test]
    fn test_start_game_moves_to_lobby() {
        let mut session = GameSession::with_rng(20, DEFAULT_SESSION_TTL, StdRng::seed_from_u64(1));
        let (key, event) = assert_ok!(session.start_game(
            config(),
            Some(&eighties(20)),
            &[PLAYER.to_string()]
        ));

        assert_eq!(session.state(), GameState::Lobby);
        assert_eq!(key.len(), 32);
        assert_eq!(session.tracks_remaining(), 20);
        assert!(matches!(event, GameEvent::GameStarted { tracks_available: 20, .. }));
        assert_eq!(
            session.start_game(config(), Some(&eighties(20)), &[PLAYER.to_string()]),
            Err(GameError::GameAlreadyStarted)
        );
    }

    #[test]
    fn test_start_game_validation() {
        let mut session = GameSession::new(20, DEFAULT_SESSION_TTL);
        let players = [PLAYER.to_string()];

        let bad_timer = GameConfig {
            timer_duration: 1,
            ..config()
        };
        assert!(matches!(
            session.start_game(bad_timer, Some(&eighties(20)), &players),
            Err(GameError::ValidationFailed(_))
        ));

        assert_eq!(
            session.start_game(config(), None, &players),
            Err(GameError::PlaylistNotFound("eighties".to_string()))
        );

        assert!(matches!(
            session.start_game(config(), Some(&eighties(20)), &[]),
            Err(GameError::ValidationFailed(_))
        ));

        let wants_many = GameConfig {
            rounds: Some(25),
            ..config()
        };
        assert_eq!(
            session.start_game(wants_many, Some(&eighties(20)), &players),
            Err(GameError::InsufficientTracks {
                available: 20,
                required: 25
            })
        );

        let out_of_range = GameConfig {
            year_range: (1990, 1999),
            ..config()
        };
        assert_eq!(
            session.start_game(out_of_range, Some(&eighties(20)), &players),
            Err(GameError::InsufficientTracks {
                available: 0,
                required: 1
            })
        );
        assert_eq!(session.state(), GameState::Setup);
    }

    #[test]
    fn test_commands_before_start_fail() {
        let mut session = GameSession::new(20, DEFAULT_SESSION_TTL);
        assert_eq!(session.next_round(T0), Err(GameError::GameNotStarted));
        assert_eq!(session.skip_round(T0).unwrap_err(), GameError::GameNotStarted);
        assert_eq!(
            session.join("Sarah", false, T0).unwrap_err(),
            GameError::GameNotStarted
        );
        assert_eq!(
            session.submit_guess("Sarah", 1986, false, None, T0),
            Err(GameError::GameNotStarted)
        );
    }

    #[test]
    fn test_round_lifecycle() {
        let mut session = started_session();
        session.join("Sarah", false, T0).unwrap();

        let advance = session.next_round(T0).unwrap();
        assert!(matches!(advance, RoundAdvance::Started { round_number: 1, .. }));
        assert_eq!(session.state(), GameState::Active);
        assert_eq!(session.tracks_remaining(), 19);
        assert_eq!(session.next_round(T0), Err(GameError::RoundInProgress));

        assert_eq!(session.expire_round_if_due(T0 + 29_999), None);
        let ended = session.expire_round_if_due(T0 + 30_000).unwrap();
        assert!(matches!(ended, GameEvent::RoundEnded { round_number: 1, .. }));
        assert_eq!(session.state(), GameState::Results);
        assert!(session.current_round().is_none());
        assert_eq!(session.last_settled_round().unwrap().round_number, 1);

        let advance = session.next_round(T0 + 40_000).unwrap();
        assert!(matches!(advance, RoundAdvance::Started { round_number: 2, .. }));
    }

    #[test]
    fn test_sarah_bets_on_exact_year() {
        let mut session = started_session();
        session.join("Sarah", true, T0).unwrap();
        session.next_round(T0).unwrap();

        session
            .submit_guess("Sarah", 1986, true, Some(T0 + 5_000), T0 + 5_000)
            .unwrap();
        let event = session.expire_round_if_due(T0 + 30_000).unwrap();

        match event {
            GameEvent::RoundEnded {
                correct_year,
                results,
                leaderboard,
                ..
            } => {
                assert_eq!(correct_year, 1986);
                assert_eq!(results[0].player_name, "Sarah");
                assert_eq!(results[0].points_earned, 20);
                assert_eq!(leaderboard[0].rank, 1);
                assert_eq!(leaderboard[0].player_name, "Sarah");
                assert_eq!(leaderboard[0].total_points, 20);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_submit_after_deadline_uses_server_clock() {
        let mut session = started_session();
        session.join("Sarah", false, T0).unwrap();
        session.next_round(T0).unwrap();

        // Client claims it answered in time; the server clock disagrees
        assert_eq!(
            session.submit_guess("Sarah", 1986, false, Some(T0 + 1_000), T0 + 30_001),
            Err(GameError::TimerExpired)
        );

        session.expire_round_if_due(T0 + 30_001).unwrap();
        assert_eq!(
            session.submit_guess("Sarah", 1986, false, None, T0 + 30_002),
            Err(GameError::TimerExpired)
        );
    }

    #[test]
    fn test_duplicate_and_unknown_submissions() {
        let mut session = started_session();
        session.join("Sarah", false, T0).unwrap();
        session.next_round(T0).unwrap();

        let event = session.submit_guess("Sarah", 1985, false, None, T0 + 1).unwrap();
        assert_eq!(
            event,
            GameEvent::GuessSubmitted {
                player_name: "Sarah".to_string(),
                submitted_count: 1,
                total_players: 1,
            }
        );
        assert_eq!(
            session.submit_guess("Sarah", 1986, true, None, T0 + 2),
            Err(GameError::AlreadySubmitted)
        );
        assert_eq!(
            session.submit_guess("Ghost", 1986, false, None, T0 + 2),
            Err(GameError::PlayerNotFound("Ghost".to_string()))
        );
        assert!(matches!(
            session.submit_guess("Sarah", 3000, false, None, T0 + 2),
            Err(GameError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_bets_toggle_and_clear_on_next_round() {
        let mut session = started_session();
        session.join("Sarah", false, T0).unwrap();
        session.next_round(T0).unwrap();

        let event = session.place_bet("Sarah", true, T0 + 1).unwrap();
        assert_eq!(
            event,
            GameEvent::BetPlaced {
                player_name: "Sarah".to_string(),
                bet_active: true
            }
        );
        assert!(session.registry().get("Sarah").unwrap().bet_active);

        session.submit_guess("Sarah", 1986, true, None, T0 + 2).unwrap();
        assert_eq!(
            session.place_bet("Sarah", false, T0 + 3),
            Err(GameError::AlreadySubmitted)
        );

        session.skip_round(T0 + 4).unwrap();
        assert!(!session.registry().get("Sarah").unwrap().bet_active);
    }

    #[test]
    fn test_skip_settles_and_starts_next_round() {
        let mut session = started_session();
        session.join("Sarah", false, T0).unwrap();
        session.next_round(T0).unwrap();
        session.submit_guess("Sarah", 1986, false, None, T0 + 1).unwrap();

        let (ended, advance) = session.skip_round(T0 + 2).unwrap();
        assert!(matches!(ended, Some(GameEvent::RoundEnded { round_number: 1, .. })));
        assert!(matches!(advance, RoundAdvance::Started { round_number: 2, .. }));
        assert_eq!(session.state(), GameState::Active);
        assert_eq!(session.registry().get("Sarah").unwrap().total_score, 10);

        // The new round has its own deadline
        assert_eq!(session.expire_round_if_due(T0 + 30_001), None);
    }

    #[test]
    fn test_skip_from_lobby_starts_round() {
        let mut session = started_session();
        let (ended, advance) = session.skip_round(T0).unwrap();
        assert!(ended.is_none());
        assert!(matches!(advance, RoundAdvance::Started { round_number: 1, .. }));
    }

    #[test]
    fn test_playlist_exhaustion_ends_game() {
        let mut session = GameSession::with_rng(20, DEFAULT_SESSION_TTL, StdRng::seed_from_u64(3));
        session
            .start_game(config(), Some(&eighties(1)), &[PLAYER.to_string()])
            .unwrap();
        session.next_round(T0).unwrap();
        session.expire_round_if_due(T0 + 30_000).unwrap();

        let advance = session.next_round(T0 + 31_000).unwrap();
        assert!(matches!(
            advance,
            RoundAdvance::Ended {
                reason: EndReason::PlaylistExhausted,
                ..
            }
        ));
        assert_eq!(session.state(), GameState::Ended);
        assert_eq!(session.next_round(T0), Err(GameError::PlaylistExhausted));
    }

    #[test]
    fn test_round_limit_ends_game() {
        let mut session = GameSession::with_rng(20, DEFAULT_SESSION_TTL, StdRng::seed_from_u64(3));
        let limited = GameConfig {
            rounds: Some(1),
            ..config()
        };
        session
            .start_game(limited, Some(&eighties(5)), &[PLAYER.to_string()])
            .unwrap();
        session.next_round(T0).unwrap();

        let (_, advance) = session.skip_round(T0 + 1).unwrap();
        assert!(matches!(
            advance,
            RoundAdvance::Ended {
                reason: EndReason::RoundLimitReached,
                ..
            }
        ));
        assert_eq!(session.state(), GameState::Ended);
    }

    #[test]
    fn test_reset_drops_everything() {
        let mut session = started_session();
        session.join("Sarah", true, T0).unwrap();
        session.next_round(T0).unwrap();
        let generation = session.generation();

        let event = session.reset();
        assert!(matches!(event, GameEvent::GameReset { .. }));
        assert_eq!(session.state(), GameState::Setup);
        assert!(session.registry().is_empty());
        assert!(session.current_round().is_none());
        assert_eq!(session.generation(), generation + 1);

        // No pending expiry survives the reset
        assert_eq!(session.expire_round_if_due(T0 + 60_000), None);
        assert!(!session.admin_key_matches(None));
    }

    #[test]
    fn test_admin_authorization() {
        let mut session = GameSession::with_rng(20, DEFAULT_SESSION_TTL, StdRng::seed_from_u64(9));
        let (key, _) = session
            .start_game(config(), Some(&eighties(3)), &[PLAYER.to_string()])
            .unwrap();
        let (host, _) = session.join("Host", true, T0).unwrap();
        let (guest, _) = session.join("Guest", false, T0).unwrap();

        assert!(session.is_authorized_admin(Some("Host"), None, None));
        assert!(!session.is_authorized_admin(Some("Guest"), None, None));
        assert!(session.is_authorized_admin(None, Some(&key), None));
        assert!(!session.is_authorized_admin(None, Some("wrong"), None));
        assert!(session.is_authorized_admin(None, None, Some(&host.session_token)));
        assert!(!session.is_authorized_admin(None, None, Some(&guest.session_token)));
    }

    #[test]
    fn test_playback_failures_are_bounded() {
        let mut session = started_session();
        session.next_round(T0).unwrap();
        let generation = session.generation();

        for attempt in 1..=3 {
            assert!(session.retry_playback().is_ok());
            match session.record_playback_failure(generation, Some(1), "unreachable") {
                Some(GameEvent::PlaybackError {
                    retry_count,
                    max_retries,
                    can_retry,
                    ..
                }) => {
                    assert_eq!(retry_count, attempt);
                    assert_eq!(max_retries, 3);
                    assert_eq!(can_retry, attempt < 3);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(session.retry_playback(), Err(GameError::MaxRetriesReached(3)));
    }

    #[test]
    fn test_stale_playback_results_ignored() {
        let mut session = started_session();
        session.next_round(T0).unwrap();
        let generation = session.generation();

        assert_eq!(session.record_playback_failure(generation, Some(7), "x"), None);
        assert_eq!(session.record_playback_failure(generation + 1, Some(1), "x"), None);

        session.reset();
        assert_eq!(session.record_playback_failure(generation, Some(1), "x"), None);
    }

    #[test]
    fn test_status_snapshot() {
        let mut session = started_session();
        session.join("Sarah", false, T0).unwrap();
        session.next_round(T0).unwrap();

        let status = session.status();
        assert_eq!(status.state, GameState::Active);
        assert_eq!(status.round_number, 1);
        assert_eq!(status.rounds_played, 0);
        assert_eq!(status.tracks_remaining, 19);
        assert_eq!(status.total_players, 1);
        assert_eq!(status.connected_players, 1);
        assert_eq!(status.players[0].name, "Sarah");

        session.registry.detach("Sarah", T0 + 1);
        let status = session.status();
        assert_eq!(status.total_players, 1);
        assert_eq!(status.connected_players, 0);
    }
}
