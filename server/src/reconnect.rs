//! Resuming a returning client from its session token.
//!
//! The snapshot is computed from the live session at the instant of the
//! call. An active round is described by its absolute `started_at` so the
//! client can recompute the remaining time itself, independent of how long
//! the reconnect took to reach it.

use crate::error::Result;
use crate::game::GameSession;
use crate::registry::Player;
use shared::{ActiveRoundData, GameState, ReconnectResult, ResultsData, RoundData, View};

/// A resolved reconnect
#[derive(Debug, Clone, PartialEq)]
pub struct Resumed {
    pub result: ReconnectResult,
    /// The player had no open socket before this call
    pub came_online: bool,
}

/// Validates the token and attaches a new socket to the player.
///
/// `attach` is false when the calling socket is already bound to this
/// player, which keeps repeated reconnects on one socket from inflating the
/// presence count. Either way the same player is returned and nobody new is
/// registered.
pub fn resume(
    session: &mut GameSession,
    token: &str,
    name: &str,
    now: u64,
    attach: bool,
) -> Result<Resumed> {
    let was_connected = session.registry.find_by_token(token, name, now)?.connected;

    if attach {
        session.registry.attach(name, now)?;
    } else {
        session.registry.touch(name, now);
    }

    let player = session.registry.get(name)?;
    Ok(Resumed {
        result: snapshot(session, player, now),
        came_online: attach && !was_connected,
    })
}

/// Point-in-time view of the session for one player
pub fn snapshot(session: &GameSession, player: &Player, now: u64) -> ReconnectResult {
    let state = session.state();

    ReconnectResult {
        success: true,
        player: player.session_view(),
        game_state: state,
        current_view: View::from(state),
        round_data: round_data(session, player, now),
        players: session.registry.views(),
    }
}

fn round_data(session: &GameSession, player: &Player, now: u64) -> Option<RoundData> {
    match session.state() {
        GameState::Active => {
            let round = session.current_round()?;
            let config = session.config()?;
            Some(RoundData::Active(ActiveRoundData {
                round_number: round.round_number,
                song: round.track.teaser(),
                started_at: round.started_at(),
                timer_duration: round.timer.duration_seconds,
                remaining_seconds: round.timer.remaining_seconds(now),
                server_now: now,
                year_range: config.year_range,
                has_submitted: round.has_submitted(&player.name),
                bet_active: player.bet_active,
            }))
        }
        GameState::Results | GameState::Ended => {
            let round = session.last_settled_round()?;
            Some(RoundData::Results(ResultsData {
                round_number: round.round_number,
                song: round.track.revealed(),
                correct_year: round.track.year,
                results: round.results.clone(),
                leaderboard: session.leaderboard(),
            }))
        }
        GameState::Setup | GameState::Lobby => None,
    }
}
