//! Player roster for the running game
//!
//! This module tracks everyone who has joined the current session:
//! - Display name uniqueness and deterministic suffixing on collisions
//! - Opaque session tokens handed out for reconnection
//! - Admin designation, granted once and kept for the token's lifetime
//! - Presence (live socket count) and last-seen timestamps for expiry
//!
//! Players are only removed by a full game reset, which replaces the
//! registry wholesale.

use crate::error::{GameError, Result};
use crate::utils::generate_token;
use log::info;
use rand::Rng;
use shared::{PlayerView, SessionPlayer, MAX_NAME_LENGTH};
use std::time::Duration;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_PLAYERS: usize = 20;

/// A participant in the current game
#[derive(Debug, Clone)]
pub struct Player {
    /// Reconnection secret issued by the server
    pub session_token: String,
    pub name: String,
    pub is_admin: bool,
    /// May go negative through bet penalties
    pub total_score: i64,
    pub connected: bool,
    /// Last time the player sent anything or closed their last socket
    pub last_seen_at: u64,
    /// Bet indicator for the current round, cleared when a round starts
    pub bet_active: bool,
    live_connections: u32,
}

impl Player {
    fn new(session_token: String, name: String, is_admin: bool, now: u64) -> Self {
        Self {
            session_token,
            name,
            is_admin,
            total_score: 0,
            connected: true,
            last_seen_at: now,
            bet_active: false,
            live_connections: 1,
        }
    }

    /// A disconnected player whose last activity is older than `ttl`
    pub fn is_expired(&self, now: u64, ttl: Duration) -> bool {
        !self.connected && now.saturating_sub(self.last_seen_at) > ttl.as_millis() as u64
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            name: self.name.clone(),
            is_admin: self.is_admin,
            total_score: self.total_score,
            connected: self.connected,
        }
    }

    pub fn session_view(&self) -> SessionPlayer {
        SessionPlayer {
            session_id: self.session_token.clone(),
            player_name: self.name.clone(),
            is_admin: self.is_admin,
            total_score: self.total_score,
        }
    }
}

/// What a successful join hands back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub player_name: String,
    pub session_token: String,
    pub name_adjusted: bool,
    pub original_name: Option<String>,
    pub is_admin: bool,
}

pub struct SessionRegistry {
    /// Join order is preserved
    players: Vec<Player>,
    max_players: usize,
    session_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(max_players: usize, session_ttl: Duration) -> Self {
        Self {
            players: Vec::new(),
            max_players,
            session_ttl,
        }
    }

    /// Registers a new player.
    ///
    /// A name already taken (case-insensitively) gets the lowest free numeric
    /// suffix starting at 2. Only the first admin-flagged join becomes admin;
    /// later ones join as regular players.
    pub fn join<R: Rng + ?Sized>(
        &mut self,
        requested: &str,
        wants_admin: bool,
        now: u64,
        rng: &mut R,
    ) -> Result<JoinOutcome> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(GameError::ValidationFailed("name must not be empty".into()));
        }
        if requested.chars().count() > MAX_NAME_LENGTH {
            return Err(GameError::ValidationFailed(format!(
                "name must be at most {} characters",
                MAX_NAME_LENGTH
            )));
        }

        // Enforce capacity limits
        if self.players.len() >= self.max_players {
            return Err(GameError::GameFull(self.max_players));
        }

        let player_name = self.unique_name(requested);
        let name_adjusted = player_name != requested;
        let is_admin = wants_admin && self.admin().is_none();

        let mut session_token = generate_token(rng);
        while self.players.iter().any(|p| p.session_token == session_token) {
            session_token = generate_token(rng);
        }

        info!(
            "Player '{}' joined{}{}",
            player_name,
            if is_admin { " as admin" } else { "" },
            if name_adjusted {
                format!(" (requested '{}')", requested)
            } else {
                String::new()
            }
        );

        self.players.push(Player::new(
            session_token.clone(),
            player_name.clone(),
            is_admin,
            now,
        ));

        Ok(JoinOutcome {
            player_name,
            session_token,
            name_adjusted,
            original_name: name_adjusted.then(|| requested.to_string()),
            is_admin,
        })
    }

    fn unique_name(&self, requested: &str) -> String {
        if !self.name_taken(requested) {
            return requested.to_string();
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{}{}", requested, suffix);
            if !self.name_taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a returning player by token and name
    pub fn find_by_token(&self, token: &str, name: &str, now: u64) -> Result<&Player> {
        let player = self
            .players
            .iter()
            .find(|p| p.session_token == token && p.name == name)
            .ok_or(GameError::SessionNotFound)?;

        if player.is_expired(now, self.session_ttl) {
            return Err(GameError::SessionExpired);
        }

        Ok(player)
    }

    pub fn find_by_token_only(&self, token: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.session_token == token)
    }

    /// Records a newly opened socket for the player
    pub fn attach(&mut self, name: &str, now: u64) -> Result<()> {
        let player = self.get_mut(name)?;
        player.live_connections += 1;
        player.connected = true;
        player.last_seen_at = now;
        Ok(())
    }

    /// Records a closed socket. Returns true when the player just went offline.
    pub fn detach(&mut self, name: &str, now: u64) -> bool {
        match self.players.iter_mut().find(|p| p.name == name) {
            Some(player) => {
                player.live_connections = player.live_connections.saturating_sub(1);
                player.last_seen_at = now;
                let went_offline = player.connected && player.live_connections == 0;
                player.connected = player.live_connections > 0;
                went_offline
            }
            None => false,
        }
    }

    pub fn touch(&mut self, name: &str, now: u64) {
        if let Some(player) = self.players.iter_mut().find(|p| p.name == name) {
            player.last_seen_at = now;
        }
    }

    pub fn get(&self, name: &str) -> Result<&Player> {
        self.players
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| GameError::PlayerNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Player> {
        self.players
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| GameError::PlayerNotFound(name.to_string()))
    }

    pub fn admin(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_admin)
    }

    pub fn add_points(&mut self, name: &str, points: i32) {
        if let Some(player) = self.players.iter_mut().find(|p| p.name == name) {
            player.total_score += i64::from(points);
        }
    }

    pub fn clear_bets(&mut self) {
        for player in &mut self.players {
            player.bet_active = false;
        }
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect()
    }

    pub fn scores(&self) -> impl Iterator<Item = (&str, i64)> {
        self.players
            .iter()
            .map(|p| (p.name.as_str(), p.total_score))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio_test::{assert_err, assert_ok};

    const NOW: u64 = 1_700_000_000_000;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(4, Duration::from_secs(3600))
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_join_issues_token() {
        let mut registry = registry();
        let outcome = assert_ok!(registry.join("Sarah", false, NOW, &mut rng()));

        assert_eq!(outcome.player_name, "Sarah");
        assert!(!outcome.name_adjusted);
        assert_eq!(outcome.original_name, None);
        assert_eq!(outcome.session_token.len(), 32);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("Sarah").unwrap().connected);
    }

    #[test]
    fn test_duplicate_names_get_suffix() {
        let mut registry = registry();
        let mut rng = rng();
        let first = registry.join("Sarah", false, NOW, &mut rng).unwrap();
        let second = registry.join("Sarah", false, NOW, &mut rng).unwrap();
        let third = registry.join("sarah", false, NOW, &mut rng).unwrap();

        assert_eq!(second.player_name, "Sarah2");
        assert!(second.name_adjusted);
        assert_eq!(second.original_name.as_deref(), Some("Sarah"));
        assert_eq!(third.player_name, "sarah3");
        assert_ne!(first.session_token, second.session_token);
    }

    #[test]
    fn test_name_is_trimmed_and_validated() {
        let mut registry = registry();
        let mut rng = rng();

        assert_eq!(
            registry.join("  Bo  ", false, NOW, &mut rng).unwrap().player_name,
            "Bo"
        );
        assert!(matches!(
            registry.join("   ", false, NOW, &mut rng),
            Err(GameError::ValidationFailed(_))
        ));
        assert!(matches!(
            registry.join(&"x".repeat(MAX_NAME_LENGTH + 1), false, NOW, &mut rng),
            Err(GameError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_first_admin_join_wins() {
        let mut registry = registry();
        let mut rng = rng();
        let host = registry.join("Host", true, NOW, &mut rng).unwrap();
        let sneaky = registry.join("Sneaky", true, NOW, &mut rng).unwrap();

        assert!(host.is_admin);
        assert!(!sneaky.is_admin);
        assert_eq!(registry.admin().unwrap().name, "Host");
    }

    #[test]
    fn test_capacity_enforced() {
        let mut registry = SessionRegistry::new(1, DEFAULT_SESSION_TTL);
        let mut rng = rng();
        assert_ok!(registry.join("A", false, NOW, &mut rng));
        assert_eq!(
            registry.join("B", false, NOW, &mut rng),
            Err(GameError::GameFull(1))
        );
    }

    #[test]
    fn test_find_by_token() {
        let mut registry = registry();
        let outcome = registry.join("Sarah", false, NOW, &mut rng()).unwrap();

        let player = assert_ok!(registry.find_by_token(&outcome.session_token, "Sarah", NOW));
        assert_eq!(player.name, "Sarah");

        assert_eq!(
            registry.find_by_token("nope", "Sarah", NOW).unwrap_err(),
            GameError::SessionNotFound
        );
        assert_eq!(
            registry
                .find_by_token(&outcome.session_token, "Other", NOW)
                .unwrap_err(),
            GameError::SessionNotFound
        );
    }

    #[test]
    fn test_session_expires_only_while_disconnected() {
        let mut registry = SessionRegistry::new(4, Duration::from_secs(60));
        let outcome = registry.join("Sarah", false, NOW, &mut rng()).unwrap();
        let token = outcome.session_token;

        // Connected players never expire
        assert_ok!(registry.find_by_token(&token, "Sarah", NOW + 120_000));

        assert!(registry.detach("Sarah", NOW));
        assert_ok!(registry.find_by_token(&token, "Sarah", NOW + 60_000));
        assert_err!(registry.find_by_token(&token, "Sarah", NOW + 60_001));
        assert_eq!(
            registry
                .find_by_token(&token, "Sarah", NOW + 60_001)
                .unwrap_err(),
            GameError::SessionExpired
        );
    }

    #[test]
    fn test_presence_counts_sockets() {
        let mut registry = registry();
        registry.join("Sarah", false, NOW, &mut rng()).unwrap();
        registry.attach("Sarah", NOW + 1).unwrap();

        assert!(!registry.detach("Sarah", NOW + 2));
        assert!(registry.get("Sarah").unwrap().connected);
        assert!(registry.detach("Sarah", NOW + 3));
        assert!(!registry.get("Sarah").unwrap().connected);
        assert_eq!(registry.get("Sarah").unwrap().last_seen_at, NOW + 3);
        assert!(!registry.detach("Sarah", NOW + 4));
        assert_eq!(registry.connected_count(), 0);
    }

    #[test]
    fn test_points_and_bets() {
        let mut registry = registry();
        registry.join("Sarah", false, NOW, &mut rng()).unwrap();
        registry.add_points("Sarah", 20);
        registry.add_points("Sarah", -5);
        registry.get_mut("Sarah").unwrap().bet_active = true;
        registry.clear_bets();

        let sarah = registry.get("Sarah").unwrap();
        assert_eq!(sarah.total_score, 15);
        assert!(!sarah.bet_active);
    }
}
