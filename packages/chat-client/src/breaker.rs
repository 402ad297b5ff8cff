//! Failure accounting for connection attempts
//!
//! [`FailureCircuitBreaker`] counts consecutive failures and opens at a fixed
//! threshold; [`CooldownWindow`] remembers the last attempt so rapid retries can
//! be reported. The cooldown never blocks an attempt.

use std::time::{Duration, Instant};

/// Consecutive-failure counter with a trip threshold
#[derive(Debug, Clone)]
pub struct FailureCircuitBreaker {
    threshold: u32,
    failures: u32,
}

impl FailureCircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: 0,
        }
    }

    /// Count a failure; returns true when this failure opens the breaker
    pub fn record_failure(&mut self) -> bool {
        let was_tripped = self.is_tripped();
        self.failures = self.failures.saturating_add(1);
        !was_tripped && self.is_tripped()
    }

    /// A successful connection closes the breaker
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Explicit re-enable
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_tripped(&self) -> bool {
        self.failures >= self.threshold
    }

    /// Failures left before the breaker opens
    pub fn remaining(&self) -> u32 {
        self.threshold.saturating_sub(self.failures)
    }
}

/// Timestamp of the last attempt plus a fixed window
#[derive(Debug, Clone)]
pub struct CooldownWindow {
    duration: Duration,
    last_attempt: Option<Instant>,
}

impl CooldownWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last_attempt: None,
        }
    }

    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// True when `now` falls inside the window after the last attempt
    pub fn is_cooling(&self, now: Instant) -> bool {
        self.last_attempt
            .map(|last| now.saturating_duration_since(last) < self.duration)
            .unwrap_or(false)
    }

    /// Time since the last attempt, if one was recorded
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.last_attempt
            .map(|last| now.saturating_duration_since(last))
    }

    pub fn reset(&mut self) {
        self.last_attempt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_exactly_once_at_threshold() {
        let mut breaker = FailureCircuitBreaker::new(3);
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert_eq!(breaker.remaining(), 1);
        assert!(breaker.record_failure());
        assert!(breaker.is_tripped());
        // Further failures do not re-trip
        assert!(!breaker.record_failure());
    }

    #[test]
    fn test_success_resets_count() {
        let mut breaker = FailureCircuitBreaker::new(3);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failures(), 0);
        assert!(!breaker.record_failure());
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let breaker = FailureCircuitBreaker::new(0);
        assert_eq!(breaker.threshold(), 1);
    }

    #[test]
    fn test_cooldown_window() {
        let mut window = CooldownWindow::new(Duration::from_secs(3));
        let start = Instant::now();
        assert!(!window.is_cooling(start));

        window.record_attempt(start);
        assert!(window.is_cooling(start + Duration::from_secs(1)));
        assert!(!window.is_cooling(start + Duration::from_secs(3)));

        window.reset();
        assert!(!window.is_cooling(start + Duration::from_secs(1)));
        assert!(window.elapsed(start).is_none());
    }
}
