//! Circuit breaker state machine (spec.md §4.1, GLOSSARY).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Three-state controller gating poll calls under sustained failure.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether a call should be attempted right now. May transition
    /// `Open -> HalfOpen` as a side effect once the recovery dwell has
    /// elapsed — the state machine never jumps straight from `Closed` to
    /// `HalfOpen`.
    pub fn allow_call(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_at
                    .map(|t| t.elapsed() >= self.recovery_timeout)
                    .unwrap_or(false);
                if elapsed {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Resets the failure counter and closes the
    /// circuit regardless of the state it was called from.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    /// Record a failed call, returning `true` if this call just opened the
    /// circuit (i.e. it was the transition that crossed the threshold, or a
    /// half-open probe that failed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.last_failure_at = Some(Instant::now());

        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                true
            }
            CircuitState::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.state = CircuitState::Open;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_failure_does_not_open_breaker() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(30));
        assert!(!cb.record_failure());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn three_consecutive_failures_open_the_breaker() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(30));
        cb.record_failure();
        cb.record_failure();
        assert!(cb.record_failure());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn never_jumps_directly_from_closed_to_half_open() {
        let mut cb = CircuitBreaker::new(1, Duration::from_millis(1));
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        // must pass through Open before HalfOpen is ever observed.
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn recovers_through_half_open_after_dwell() {
        let mut cb = CircuitBreaker::new(1, Duration::from_millis(5));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_call());
        std::thread::sleep(Duration::from_millis(10));
        assert!(cb.allow_call());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let mut cb = CircuitBreaker::new(1, Duration::from_millis(5));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cb.allow_call());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_in_any_state_resets_to_closed() {
        let mut cb = CircuitBreaker::new(1, Duration::from_millis(5));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }
}
