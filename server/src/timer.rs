//! Server-authoritative round timing.
//!
//! A round's deadline is derived from the absolute server timestamp at which
//! it started. Client-reported times are never consulted.

use std::time::Duration;

/// How often the session actor polls for an expired round
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimer {
    pub started_at: u64,
    pub duration_seconds: u32,
}

impl RoundTimer {
    pub fn new(started_at: u64, duration_seconds: u32) -> Self {
        Self {
            started_at,
            duration_seconds,
        }
    }

    pub fn deadline(&self) -> u64 {
        self.started_at + u64::from(self.duration_seconds) * 1000
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.deadline()
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.deadline().saturating_sub(now)
    }

    /// Whole seconds left, rounded up so a client never shows 0 early
    pub fn remaining_seconds(&self, now: u64) -> u32 {
        self.remaining_ms(now).div_ceil(1000) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_from_absolute_start() {
        let timer = RoundTimer::new(1_000_000, 30);
        assert_eq!(timer.deadline(), 1_030_000);
    }

    #[test]
    fn test_expiry_boundary() {
        let timer = RoundTimer::new(1_000_000, 30);
        assert!(!timer.is_expired(1_029_999));
        assert!(timer.is_expired(1_030_000));
        assert!(timer.is_expired(2_000_000));
    }

    #[test]
    fn test_remaining_time() {
        let timer = RoundTimer::new(1_000_000, 30);
        assert_eq!(timer.remaining_ms(1_000_000), 30_000);
        assert_eq!(timer.remaining_seconds(1_000_000), 30);
        assert_eq!(timer.remaining_seconds(1_010_500), 20);
        assert_eq!(timer.remaining_seconds(1_029_999), 1);
        assert_eq!(timer.remaining_seconds(1_030_000), 0);
        assert_eq!(timer.remaining_ms(5_000_000), 0);
    }

    #[test]
    fn test_clock_before_start_does_not_underflow() {
        let timer = RoundTimer::new(1_000_000, 10);
        assert_eq!(timer.remaining_ms(500_000), 510_000);
        assert!(!timer.is_expired(0));
    }
}
