//! Per-channel circuit breaker (spec.md §4.2), grounded on the teacher's
//! `utils::circuit_breaker` state machine, retuned to this spec's
//! threshold (3 failures) and reset timeout (60 s) rather than the
//! teacher's 30 s/2-success config.

use crate::errors::SessionError;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    threshold: u32,
    reset_timeout: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(3, Duration::from_secs(60))
    }

    pub fn with_config(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            opened_at: None,
            threshold,
            reset_timeout,
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.state
    }

    /// Call before attempting a guarded operation. `Ok` means proceed
    /// (closed, or a half-open trial); `Err` means fail fast.
    pub fn allow(&mut self) -> Result<(), SessionError> {
        match self.state {
            CircuitBreakerState::Closed => Ok(()),
            CircuitBreakerState::HalfOpen => Ok(()),
            CircuitBreakerState::Open => {
                let elapsed = self.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.reset_timeout {
                    self.state = CircuitBreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(SessionError::CircuitOpen)
                }
            }
        }
    }

    pub fn on_success(&mut self) {
        self.state = CircuitBreakerState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
    }

    pub fn on_failure(&mut self) {
        match self.state {
            CircuitBreakerState::HalfOpen => self.trip(),
            CircuitBreakerState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.threshold {
                    self.trip();
                }
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn trip(&mut self) {
        self.state = CircuitBreakerState::Open;
        self.opened_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let mut cb = CircuitBreaker::with_config(3, Duration::from_secs(60));
        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        cb.on_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Open);
    }

    #[test]
    fn open_fails_fast() {
        let mut cb = CircuitBreaker::with_config(1, Duration::from_secs(60));
        cb.on_failure();
        assert_eq!(cb.allow(), Err(SessionError::CircuitOpen));
    }

    #[test]
    fn half_open_after_reset_timeout_elapses() {
        let mut cb = CircuitBreaker::with_config(1, Duration::from_millis(10));
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow().is_ok());
        assert_eq!(cb.state(), CircuitBreakerState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_and_resets_counter() {
        let mut cb = CircuitBreaker::with_config(1, Duration::from_millis(10));
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(20));
        cb.allow().unwrap();
        cb.on_success();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        cb.on_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_and_restarts_timer() {
        let mut cb = CircuitBreaker::with_config(1, Duration::from_millis(10));
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(20));
        cb.allow().unwrap();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Open);
        assert_eq!(cb.allow(), Err(SessionError::CircuitOpen));
    }
}
