//! A single song-guessing cycle and the guesses collected during it.

use crate::error::{GameError, Result};
use crate::playlist::Track;
use crate::scoring;
use crate::timer::RoundTimer;
use shared::{GameConfig, RoundResult};
use std::collections::BTreeMap;

/// A player's answer. Write-once per player per round.
#[derive(Debug, Clone, PartialEq)]
pub struct Guess {
    pub year_guess: i32,
    pub bet_placed: bool,
    /// Server receive time
    pub submitted_at: u64,
    /// What the client claimed; kept for logging only
    pub client_submitted_at: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Round {
    pub round_number: u32,
    pub track: Track,
    pub timer: RoundTimer,
    pub guesses: BTreeMap<String, Guess>,
    pub settled: bool,
    /// Filled in on settlement, ordered for display
    pub results: Vec<RoundResult>,
    pub playback_failures: u32,
}

impl Round {
    pub fn new(round_number: u32, track: Track, started_at: u64, duration_seconds: u32) -> Self {
        Self {
            round_number,
            track,
            timer: RoundTimer::new(started_at, duration_seconds),
            guesses: BTreeMap::new(),
            settled: false,
            results: Vec::new(),
            playback_failures: 0,
        }
    }

    pub fn started_at(&self) -> u64 {
        self.timer.started_at
    }

    pub fn has_submitted(&self, player_name: &str) -> bool {
        self.guesses.contains_key(player_name)
    }

    /// Stores a guess. Never merges with or overwrites an earlier one.
    pub fn submit(&mut self, player_name: &str, guess: Guess) -> Result<()> {
        if self.settled || self.timer.is_expired(guess.submitted_at) {
            return Err(GameError::TimerExpired);
        }
        if self.has_submitted(player_name) {
            return Err(GameError::AlreadySubmitted);
        }

        self.guesses.insert(player_name.to_string(), guess);
        Ok(())
    }

    /// Scores every player and freezes the round.
    ///
    /// Players without a guess appear with zero points. Returns the sorted
    /// results, which are also kept on the round.
    pub fn settle<'a, I>(&mut self, config: &GameConfig, players: I) -> &[RoundResult]
    where
        I: IntoIterator<Item = &'a str>,
    {
        let correct_year = self.track.year;

        let mut results: Vec<RoundResult> = players
            .into_iter()
            .map(|name| match self.guesses.get(name) {
                Some(guess) => RoundResult {
                    player_name: name.to_string(),
                    year_guess: Some(guess.year_guess),
                    bet_placed: guess.bet_placed,
                    years_off: Some(scoring::years_off(correct_year, guess.year_guess)),
                    points_earned: scoring::score(
                        correct_year,
                        guess.year_guess,
                        guess.bet_placed,
                        config,
                    ),
                },
                None => RoundResult {
                    player_name: name.to_string(),
                    year_guess: None,
                    bet_placed: false,
                    years_off: None,
                    points_earned: 0,
                },
            })
            .collect();

        scoring::sort_results(&mut results);
        self.results = results;
        self.settled = true;
        &self.results
    }
}
