//! Points for a single guess, round result ordering and leaderboard ranking.
//!
//! Everything here is pure: no clocks, no I/O, no shared state. The state
//! machine calls into this module once per guess when a round is settled.

use shared::{GameConfig, LeaderboardEntry, RoundResult};
use std::cmp::Ordering;

/// Distance in years between a guess and the correct release year
pub fn years_off(correct_year: i32, guess_year: i32) -> u32 {
    correct_year.abs_diff(guess_year)
}

/// Computes the points a guess earns.
///
/// The distance is mapped onto the exact/close/near tiers. A bet multiplies
/// a non-zero result and turns a zero result into the configured penalty.
pub fn score(correct_year: i32, guess_year: i32, bet_placed: bool, config: &GameConfig) -> i32 {
    let delta = years_off(correct_year, guess_year);

    let base = if delta == 0 {
        config.exact_points
    } else if delta <= config.close_threshold {
        config.close_points
    } else if delta <= config.near_threshold {
        config.near_points
    } else {
        0
    };

    match (bet_placed, base) {
        (false, points) => points,
        (true, 0) => config.bet_penalty,
        (true, points) => points * config.bet_multiplier,
    }
}

/// Orders round results by points earned, ties broken by name.
pub fn sort_results(results: &mut [RoundResult]) {
    results.sort_by(|a, b| {
        b.points_earned
            .cmp(&a.points_earned)
            .then_with(|| a.player_name.cmp(&b.player_name))
    });
}

/// Ranks players by total score.
///
/// Equal totals share a rank and the next distinct total skips ahead
/// (1, 1, 3). Within a shared rank players are listed by name.
pub fn leaderboard<'a, I>(scores: I) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut sorted: Vec<(&str, i64)> = scores.into_iter().collect();
    sorted.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.0.cmp(b.0),
        other => other,
    });

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(sorted.len());
    for (index, (name, total)) in sorted.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.total_points == total => prev.rank,
            _ => index as u32 + 1,
        };

        entries.push(LeaderboardEntry {
            rank,
            player_name: name.to_string(),
            total_points: total,
        });
    }

    entries
}
