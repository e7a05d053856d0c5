//! Circuit breaker state machine.
//!
//! Pure bookkeeping: callers pass the current instant, which keeps the
//! transitions testable under a paused clock. Only the health service
//! mutates breakers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls short-circuit until the cooldown elapses.
    Open,
    /// A recovery probe is in flight; calls still short-circuit.
    HalfOpen,
}

/// What a recorded result did to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Tripped,
    Recovered,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    failure_threshold: u32,
    cooldown: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn allows_calls(&self) -> bool {
        self.state == BreakerState::Closed
    }

    pub fn record_success(&mut self) -> Transition {
        self.consecutive_failures = 0;
        if self.state == BreakerState::Closed {
            return Transition::Unchanged;
        }
        self.state = BreakerState::Closed;
        self.opened_at = None;
        Transition::Recovered
    }

    pub fn record_failure(&mut self, now: Instant) -> Transition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            BreakerState::HalfOpen => {
                // Failed recovery probe: restart the cooldown.
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
                Transition::Unchanged
            }
            BreakerState::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.trip(now);
                Transition::Tripped
            }
            _ => Transition::Unchanged,
        }
    }

    /// Open immediately, regardless of the failure count.
    pub fn trip(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
    }

    /// Close and forget past failures.
    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Whether an open breaker has waited out its cooldown.
    pub fn half_open_due(&self, now: Instant) -> bool {
        self.state == BreakerState::Open
            && self
                .opened_at
                .is_some_and(|at| now.saturating_duration_since(at) >= self.cooldown)
    }

    pub fn begin_half_open(&mut self) {
        if self.state == BreakerState::Open {
            self.state = BreakerState::HalfOpen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        assert_eq!(breaker.record_failure(now), Transition::Unchanged);
        assert_eq!(breaker.record_failure(now), Transition::Unchanged);
        assert!(breaker.allows_calls());
        assert_eq!(breaker.record_failure(now), Transition::Tripped);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allows_calls());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure(now);
        breaker.record_success();
        assert_eq!(breaker.record_failure(now), Transition::Unchanged);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_outcome_decides_state() {
        let start = Instant::now();
        let cooldown = Duration::from_secs(60);
        let mut breaker = CircuitBreaker::new(1, cooldown);
        breaker.record_failure(start);

        assert!(!breaker.half_open_due(start + Duration::from_secs(59)));
        assert!(breaker.half_open_due(start + cooldown));

        breaker.begin_half_open();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.allows_calls());

        // Failed probe reopens with a fresh cooldown.
        let retry_at = start + cooldown;
        breaker.record_failure(retry_at);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.half_open_due(retry_at + Duration::from_secs(1)));

        breaker.begin_half_open();
        assert_eq!(breaker.record_success(), Transition::Recovered);
        assert!(breaker.allows_calls());
    }
}
