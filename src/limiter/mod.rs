//! Scan-attempt rate limiting
//!
//! Fixed-window counters keyed by (token reference, source address), shared
//! across concurrent validations. The limiter runs before any cryptography,
//! so a flood of garbage presentations costs one map operation each. Totals
//! are coarse: a window that rolls over forgets the previous count.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Window length and attempt ceiling for the limiter
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(900_000),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    attempts: u32,
}

/// Expired windows are swept once the map grows past this many keys
const SWEEP_THRESHOLD: usize = 4096;

/// Fixed-window attempt counter.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<(String, String), Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Record an attempt and report whether it is within bounds
    pub fn check_and_record(&self, token_ref: &str, source_address: &str) -> bool {
        self.check_and_record_at(token_ref, source_address, Instant::now())
    }

    /// Clock-explicit variant of [`check_and_record`](Self::check_and_record)
    pub fn check_and_record_at(&self, token_ref: &str, source_address: &str, now: Instant) -> bool {
        let key = (token_ref.to_string(), source_address.to_string());
        let mut inserted = false;
        // The entry guard holds the shard lock, serializing racing attempts
        // on the same key
        let mut window = self.windows.entry(key).or_insert_with(|| {
            inserted = true;
            Window {
                started: now,
                attempts: 0,
            }
        });
        if now.duration_since(window.started) >= self.config.window {
            window.started = now;
            window.attempts = 0;
        }
        window.attempts = window.attempts.saturating_add(1);
        let allowed = window.attempts <= self.config.max_attempts;
        drop(window);

        if inserted && self.windows.len() > SWEEP_THRESHOLD {
            self.sweep_expired_at(now);
        }
        allowed
    }

    /// Drop windows whose span has fully elapsed
    pub fn sweep_expired(&self) {
        self.sweep_expired_at(Instant::now());
    }

    fn sweep_expired_at(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.config.window);
    }

    /// Number of live windows (diagnostics)
    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_ms: u64, max_attempts: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(window_ms),
            max_attempts,
        })
    }

    #[test]
    fn test_allows_up_to_max_then_denies() {
        let limiter = limiter(1000, 5);
        let now = Instant::now();
        for attempt in 1..=5 {
            assert!(
                limiter.check_and_record_at("ref", "10.0.0.1", now),
                "attempt {} should be allowed",
                attempt
            );
        }
        assert!(!limiter.check_and_record_at("ref", "10.0.0.1", now));
        assert!(!limiter.check_and_record_at("ref", "10.0.0.1", now));
    }

    #[test]
    fn test_fresh_window_after_elapse() {
        let limiter = limiter(1000, 5);
        let start = Instant::now();
        for _ in 0..6 {
            limiter.check_and_record_at("ref", "10.0.0.1", start);
        }
        assert!(!limiter.check_and_record_at("ref", "10.0.0.1", start));

        // A beat past the window boundary: counting restarts
        let later = start + Duration::from_millis(1001);
        for attempt in 1..=5 {
            assert!(
                limiter.check_and_record_at("ref", "10.0.0.1", later),
                "attempt {} in new window should be allowed",
                attempt
            );
        }
        assert!(!limiter.check_and_record_at("ref", "10.0.0.1", later));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1000, 2);
        let now = Instant::now();
        assert!(limiter.check_and_record_at("ref", "10.0.0.1", now));
        assert!(limiter.check_and_record_at("ref", "10.0.0.1", now));
        assert!(!limiter.check_and_record_at("ref", "10.0.0.1", now));

        // Same token, different source
        assert!(limiter.check_and_record_at("ref", "10.0.0.2", now));
        // Different token, same source
        assert!(limiter.check_and_record_at("other", "10.0.0.1", now));
    }

    #[test]
    fn test_boundary_is_inclusive_of_the_window() {
        let limiter = limiter(1000, 1);
        let start = Instant::now();
        assert!(limiter.check_and_record_at("ref", "10.0.0.1", start));
        // Exactly at the boundary the window has elapsed
        let boundary = start + Duration::from_millis(1000);
        assert!(limiter.check_and_record_at("ref", "10.0.0.1", boundary));
    }

    #[test]
    fn test_sweep_drops_elapsed_windows() {
        let limiter = limiter(1000, 5);
        let start = Instant::now();
        limiter.check_and_record_at("a", "10.0.0.1", start);
        limiter.check_and_record_at("b", "10.0.0.2", start);
        assert_eq!(limiter.tracked_windows(), 2);

        limiter.sweep_expired_at(start + Duration::from_millis(1001));
        assert_eq!(limiter.tracked_windows(), 0);
    }

    #[test]
    fn test_sweep_keeps_live_windows() {
        let limiter = limiter(1000, 5);
        let start = Instant::now();
        limiter.check_and_record_at("old", "10.0.0.1", start);
        limiter.check_and_record_at("new", "10.0.0.1", start + Duration::from_millis(900));

        limiter.sweep_expired_at(start + Duration::from_millis(1100));
        assert_eq!(limiter.tracked_windows(), 1);
    }
}
