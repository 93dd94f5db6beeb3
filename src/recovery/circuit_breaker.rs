//! Per-error-type circuit breakers.
//!
//! State machine: Closed → Open (threshold failures inside one window) →
//! HalfOpen (first read after `next_attempt_at`) → Closed on a successful
//! probe, or Open again with a fresh window on a failed one.
//!
//! The evaluation window slides: once more than `circuit_breaker_window` has
//! passed since `window_start`, the failure count restarts, whatever the state.

use crate::core_types::ErrorType;
use crate::logging::{log_debug, log_info, log_warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking requests
    HalfOpen, // Next outcome decides
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub is_open: bool,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    /// Set whenever the breaker is open
    pub next_attempt_at: Option<Instant>,
    pub window_start: Instant,
}

/// Circuit breaker for one error type
#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    pub(crate) error_type: ErrorType,
    pub(crate) state: CircuitState,
    pub(crate) failure_count: u32,
    pub(crate) last_failure_time: Option<Instant>,
    pub(crate) next_attempt_at: Option<Instant>,
    pub(crate) window_start: Instant,
}

impl CircuitBreaker {
    pub(crate) fn new(error_type: ErrorType, now: Instant) -> Self {
        Self {
            error_type,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            next_attempt_at: None,
            window_start: now,
        }
    }

    /// Check if a request may go through.
    ///
    /// Reading an Open breaker whose `next_attempt_at` has passed moves it to
    /// HalfOpen, so the caller's request becomes the probe.
    pub(crate) fn should_allow_request(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => self.check_recovery_timeout(now),
        }
    }

    fn check_recovery_timeout(&mut self, now: Instant) -> bool {
        let Some(next_attempt_at) = self.next_attempt_at else {
            // Open without a deadline cannot happen; treat as recovered
            self.state = CircuitState::HalfOpen;
            return true;
        };

        if now >= next_attempt_at {
            log_debug!(
                error_type = %self.error_type,
                circuit_breaker = "transitioning_to_half_open",
                "Circuit breaker admitting probe request"
            );
            self.state = CircuitState::HalfOpen;
            self.next_attempt_at = None;
            true
        } else {
            false
        }
    }

    fn roll_window(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) > window {
            self.window_start = now;
            self.failure_count = 0;
        }
    }

    /// Record a successful request
    pub(crate) fn record_success(&mut self, now: Instant, window: Duration) {
        self.roll_window(now, window);

        if self.state != CircuitState::Closed {
            log_info!(
                error_type = %self.error_type,
                circuit_breaker = "recovered",
                "Circuit breaker closed after successful request"
            );
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.next_attempt_at = None;
    }

    /// Record a failed request. Returns `true` if this call opened the breaker.
    pub(crate) fn record_failure(&mut self, now: Instant, threshold: u32, window: Duration) -> bool {
        self.roll_window(now, window);
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_time = Some(now);

        match self.state {
            CircuitState::HalfOpen => {
                log_warn!(
                    error_type = %self.error_type,
                    circuit_breaker = "reopened",
                    window_seconds = window.as_secs(),
                    "Circuit breaker probe failed, reopening"
                );
                self.open(now, window);
                true
            }
            CircuitState::Open => false,
            CircuitState::Closed if self.failure_count >= threshold => {
                log_warn!(
                    error_type = %self.error_type,
                    circuit_breaker = "opened",
                    failure_count = self.failure_count,
                    failure_threshold = threshold,
                    window_seconds = window.as_secs(),
                    "Circuit breaker opened due to repeated failures"
                );
                self.open(now, window);
                true
            }
            CircuitState::Closed => false,
        }
    }

    fn open(&mut self, now: Instant, window: Duration) {
        self.state = CircuitState::Open;
        self.next_attempt_at = Some(now + window);
        self.window_start = now;
    }

    /// Time until an Open breaker admits a probe.
    pub(crate) fn retry_after(&self, now: Instant) -> Duration {
        self.next_attempt_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub(crate) fn reset(&mut self, now: Instant) {
        *self = Self::new(self.error_type, now);
    }

    pub(crate) fn snapshot(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            state: self.state,
            is_open: self.state == CircuitState::Open,
            failure_count: self.failure_count,
            last_failure_time: self.last_failure_time,
            next_attempt_at: self.next_attempt_at,
            window_start: self.window_start,
        }
    }
}

/// Breakers keyed by error type, each behind its own lock.
///
/// The map lock is only held to fetch or create a breaker handle; every
/// read-modify-write on a breaker happens under that breaker's lock.
#[derive(Debug, Default)]
pub(crate) struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<ErrorType, Arc<Mutex<CircuitBreaker>>>>,
}

impl CircuitBreakerRegistry {
    fn handle(&self, error_type: ErrorType) -> Arc<Mutex<CircuitBreaker>> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(error_type)
            .or_insert_with(|| Arc::new(Mutex::new(CircuitBreaker::new(error_type, Instant::now()))))
            .clone()
    }

    /// Run `f` atomically against the breaker for `error_type`.
    pub(crate) fn with_breaker<R>(
        &self,
        error_type: ErrorType,
        f: impl FnOnce(&mut CircuitBreaker) -> R,
    ) -> R {
        let handle = self.handle(error_type);
        let mut breaker = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut breaker)
    }
}
