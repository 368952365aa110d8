//! Reconnection backoff for broker clients
//!
//! Publishers must never stall a tick waiting out a backoff, so the schedule
//! is polled with `ready` instead of slept on.

use crate::config::ReconnectConfig;
use std::time::{Duration, Instant};

/// Exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: usize,
    retry_at: Option<Instant>,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt: 0,
            retry_at: None,
        }
    }

    /// Consecutive failures since the last success.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Delay before retry number `attempt` (1-based). Capped at the maximum,
    /// then jittered by ±20% when enabled.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(i32::MAX as usize) as i32;
        let delay_ms = self.config.initial_backoff_ms as f64 * self.config.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.config.max_backoff_ms as f64);

        if self.config.jitter {
            use std::collections::hash_map::RandomState;
            use std::hash::BuildHasher;

            let hash_value = RandomState::new().hash_one((std::thread::current().id(), attempt));
            let jitter_factor = 0.8 + (hash_value % 40) as f64 / 100.0; // 0.8 to 1.2
            Duration::from_millis((capped_ms * jitter_factor) as u64)
        } else {
            Duration::from_millis(capped_ms as u64)
        }
    }

    /// Current delay.
    pub fn delay(&self) -> Duration {
        self.delay_for(self.attempt)
    }

    /// Whether the retry budget is used up (never, when `max_retries` is 0).
    pub fn exhausted(&self) -> bool {
        self.config.max_retries != 0 && self.attempt >= self.config.max_retries
    }

    /// Whether a new attempt may be made at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        !self.exhausted() && self.retry_at.map_or(true, |at| now >= at)
    }

    /// Record a failed attempt and schedule the next one.
    pub fn record_failure(&mut self, now: Instant) {
        self.attempt += 1;
        self.retry_at = Some(now + self.delay());
    }

    /// Reset after a successful connection.
    pub fn record_success(&mut self) {
        self.attempt = 0;
        self.retry_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: bool, max_retries: usize) -> ReconnectConfig {
        ReconnectConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2.0,
            max_retries,
            jitter,
        }
    }

    #[test]
    fn test_backoff_increases() {
        let backoff = Backoff::new(config(false, 0));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let backoff = Backoff::new(config(false, 0));
        assert_eq!(backoff.delay_for(100), Duration::from_millis(1_000));
        assert_eq!(backoff.delay_for(usize::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = Backoff::new(config(true, 0));
        for attempt in 1..20 {
            let delay = backoff.delay_for(attempt).as_millis() as u64;
            let base = (100u64 << (attempt - 1).min(10)).min(1_000);
            assert!(delay >= base * 8 / 10 && delay <= base * 12 / 10, "{delay} vs {base}");
        }
    }

    #[test]
    fn test_ready_follows_schedule() {
        let mut backoff = Backoff::new(config(false, 0));
        let t0 = Instant::now();
        assert!(backoff.ready(t0));

        backoff.record_failure(t0);
        assert!(!backoff.ready(t0 + Duration::from_millis(50)));
        assert!(backoff.ready(t0 + Duration::from_millis(100)));

        backoff.record_success();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.ready(t0));
    }

    #[test]
    fn test_max_retries() {
        let mut backoff = Backoff::new(config(false, 2));
        let now = Instant::now();
        backoff.record_failure(now);
        assert!(!backoff.exhausted());
        backoff.record_failure(now);
        assert!(backoff.exhausted());
        assert!(!backoff.ready(now + Duration::from_secs(10)));
    }
}
