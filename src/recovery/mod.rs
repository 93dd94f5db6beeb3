//! Retry policy, backoff and circuit breaking for arbitrary operations
//!
//! [`RecoveryStrategyManager`] owns:
//! - a [`RecoveryStrategyConfig`] per error type (falling back to a default),
//! - a circuit breaker per error type,
//! - registered fallback / degradation alternatives.
//!
//! [`RecoveryStrategyManager::execute_with_recovery`] runs a caller-supplied
//! operation under that policy: up to `max_retries` attempts with
//! non-blocking backoff sleeps, then at most one fallback and at most one
//! degradation attempt, then the last error. Cancellation (token or
//! deadline) stops everything immediately with [`RecoveryError::Cancelled`].

pub mod alternatives;
pub mod backoff;
pub mod circuit_breaker;

use crate::config::{RecoveryCoreConfig, RecoveryStrategyConfig};
use crate::core_types::{ErrorContext, ErrorRecord, ErrorType, RetryStrategy};
use crate::error::{CancelReason, RecoveryError, RecoveryResult};
use crate::logging::{log_debug, log_info, log_warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

pub use alternatives::{AlternativeKind, FnAlternative, RecoveryAlternative};
pub use backoff::calculate_delay;
pub use circuit_breaker::{CircuitBreakerState, CircuitState};

use alternatives::AlternativeRegistry;
use circuit_breaker::CircuitBreakerRegistry;

/// Who is running the operation, and how to stop it
#[derive(Debug, Clone, Default)]
pub struct RecoveryContext {
    pub operation: String,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    /// Cancelling this token stops the recovery loop at the next suspension point
    pub cancellation: CancellationToken,
    /// Overall time budget, measured from the start of `execute_with_recovery`
    pub deadline: Option<Duration>,
}

impl RecoveryContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Context stamped onto records built from this operation's failures.
    pub fn error_context(&self) -> ErrorContext {
        ErrorContext {
            agent_id: self.agent_id.clone(),
            user_id: self.user_id.clone(),
            operation: Some(self.operation.clone()),
            ..ErrorContext::default()
        }
    }
}

/// Per-error-type retry policy, breaker state and alternatives
pub struct RecoveryStrategyManager {
    default_strategy: RecoveryStrategyConfig,
    strategies: RwLock<HashMap<ErrorType, RecoveryStrategyConfig>>,
    breakers: CircuitBreakerRegistry,
    alternatives: AlternativeRegistry,
}

impl std::fmt::Debug for RecoveryStrategyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryStrategyManager")
            .field("default_strategy", &self.default_strategy)
            .field("alternatives", &self.alternatives.len())
            .finish_non_exhaustive()
    }
}

impl Default for RecoveryStrategyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryStrategyManager {
    /// Manager where every error type uses the generic default policy
    pub fn new() -> Self {
        Self::with_strategies(RecoveryStrategyConfig::default(), HashMap::new())
    }

    /// Manager pre-loaded with the built-in per-type policies
    pub fn with_default_strategies() -> Self {
        let config = RecoveryCoreConfig::default();
        Self::with_strategies(config.default_strategy, config.strategies)
    }

    /// Manager built from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if any policy is invalid.
    pub fn from_config(config: &RecoveryCoreConfig) -> RecoveryResult<Self> {
        config.validate()?;
        Ok(Self::with_strategies(
            config.default_strategy.clone(),
            config.strategies.clone(),
        ))
    }

    fn with_strategies(
        default_strategy: RecoveryStrategyConfig,
        strategies: HashMap<ErrorType, RecoveryStrategyConfig>,
    ) -> Self {
        Self {
            default_strategy,
            strategies: RwLock::new(strategies),
            breakers: CircuitBreakerRegistry::default(),
            alternatives: AlternativeRegistry::default(),
        }
    }

    /// Install or replace the policy for `error_type`
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if the policy is invalid.
    pub fn register_strategy(
        &self,
        error_type: ErrorType,
        config: RecoveryStrategyConfig,
    ) -> RecoveryResult<()> {
        config.validate()?;
        log_debug!(
            error_type = %error_type,
            max_retries = config.max_retries,
            strategy = ?config.strategy,
            "Recovery strategy registered"
        );
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(error_type, config);
        Ok(())
    }

    /// Registered policy for `error_type`, or the default one
    pub fn get_strategy_config(&self, error_type: ErrorType) -> RecoveryStrategyConfig {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&error_type)
            .cloned()
            .unwrap_or_else(|| self.default_strategy.clone())
    }

    /// See [`backoff::calculate_delay`]
    pub fn calculate_delay(&self, attempt: u32, config: &RecoveryStrategyConfig) -> Duration {
        calculate_delay(attempt, config)
    }

    /// Whether `error` should be retried after `attempt_number` attempts.
    ///
    /// CRITICAL and EMERGENCY failures are always escalated instead, even when
    /// retryable with budget left.
    pub fn should_retry(&self, error: &ErrorRecord, attempt_number: u32) -> bool {
        let config = self.get_strategy_config(error.error_type);

        if !error.retryable || config.strategy == RetryStrategy::None {
            return false;
        }
        if attempt_number >= config.max_retries {
            return false;
        }
        if error.severity.requires_escalation() {
            return false;
        }
        !self.is_circuit_open(error.error_type)
    }

    /// Whether the breaker for `error_type` currently rejects calls.
    ///
    /// An expired Open breaker is moved to HalfOpen by this read.
    pub fn is_circuit_open(&self, error_type: ErrorType) -> bool {
        let now = Instant::now();
        self.breakers
            .with_breaker(error_type, |b| !b.should_allow_request(now))
    }

    /// Snapshot of the breaker for `error_type`, after the same expiry check
    /// as [`is_circuit_open`](Self::is_circuit_open).
    pub fn circuit_state(&self, error_type: ErrorType) -> CircuitBreakerState {
        let now = Instant::now();
        self.breakers.with_breaker(error_type, |b| {
            b.should_allow_request(now);
            b.snapshot()
        })
    }

    pub fn record_success(&self, error_type: ErrorType) {
        let window = self.get_strategy_config(error_type).circuit_breaker_window;
        let now = Instant::now();
        self.breakers
            .with_breaker(error_type, |b| b.record_success(now, window));
    }

    /// Returns `true` if this failure opened the breaker
    pub fn record_failure(&self, error_type: ErrorType) -> bool {
        let config = self.get_strategy_config(error_type);
        let now = Instant::now();
        self.breakers.with_breaker(error_type, |b| {
            b.record_failure(
                now,
                config.circuit_breaker_threshold,
                config.circuit_breaker_window,
            )
        })
    }

    pub fn reset_circuit_breaker(&self, error_type: ErrorType) {
        let now = Instant::now();
        self.breakers.with_breaker(error_type, |b| b.reset(now));
        log_info!(error_type = %error_type, "Circuit breaker reset");
    }

    /// Register the fallback tried for `error_type` once retries run out
    pub fn register_fallback<T: 'static>(
        &self,
        error_type: ErrorType,
        fallback: Arc<dyn RecoveryAlternative<T>>,
    ) {
        self.alternatives
            .register(error_type, AlternativeKind::Fallback, fallback);
    }

    /// Register the degraded path tried for `error_type` after the fallback
    pub fn register_degradation<T: 'static>(
        &self,
        error_type: ErrorType,
        degradation: Arc<dyn RecoveryAlternative<T>>,
    ) {
        self.alternatives
            .register(error_type, AlternativeKind::Degradation, degradation);
    }

    /// Run `operation` under the policy for `error_type`
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::CircuitOpen`] if the breaker rejected the first
    ///   attempt and no alternative produced a result. The operation is not run.
    /// - [`RecoveryError::Cancelled`] if the token fired or the deadline passed.
    /// - [`RecoveryError::OperationFailed`] carrying the last failure as an
    ///   [`ErrorRecord`] once every avenue is exhausted.
    pub async fn execute_with_recovery<T, F, Fut>(
        &self,
        operation: F,
        error_type: ErrorType,
        context: &RecoveryContext,
    ) -> RecoveryResult<T>
    where
        T: 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let config = self.get_strategy_config(error_type);
        let max_attempts = config.max_retries.max(1);
        let deadline = context.deadline.map(|d| Instant::now() + d);
        let mut attempt = 0;
        let mut last_error: Option<ErrorRecord> = None;

        while attempt < max_attempts {
            check_cancelled(error_type, attempt, context, deadline)?;

            let now = Instant::now();
            let admitted = self.breakers.with_breaker(error_type, |b| {
                if b.should_allow_request(now) {
                    Ok(())
                } else {
                    Err(b.retry_after(now))
                }
            });

            if let Err(retry_after) = admitted {
                if attempt > 0 {
                    break;
                }
                let blocked = ErrorRecord::new(error_type, "circuit breaker open")
                    .with_context(context.error_context());
                return match self
                    .try_alternatives(error_type, &config, &blocked, context, deadline, attempt)
                    .await?
                {
                    Some(value) => Ok(value),
                    None => Err(RecoveryError::circuit_open(
                        error_type,
                        u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    )),
                };
            }

            attempt += 1;
            log_debug!(
                error_type = %error_type,
                operation = %context.operation,
                attempt = attempt,
                max_attempts = max_attempts,
                "Executing operation with recovery"
            );

            let outcome = tokio::select! {
                biased;
                _ = context.cancellation.cancelled() => {
                    return Err(RecoveryError::cancelled(error_type, attempt, CancelReason::Aborted));
                }
                _ = deadline_elapsed(deadline) => {
                    return Err(RecoveryError::cancelled(error_type, attempt, CancelReason::DeadlineExceeded));
                }
                result = operation() => result,
            };

            let error = match outcome {
                Ok(value) => {
                    self.record_success(error_type);
                    return Ok(value);
                }
                Err(error) => ErrorRecord::from_anyhow(error, Some(error_type), context.error_context()),
            };

            let opened = self.record_failure(error_type);
            last_error = Some(error);

            if opened || attempt >= max_attempts {
                break;
            }

            let delay = calculate_delay(attempt, &config);
            log_debug!(
                error_type = %error_type,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis(),
                error = ?last_error.as_ref().map(|e| &e.message),
                "Operation failed, retrying after delay"
            );

            tokio::select! {
                biased;
                _ = context.cancellation.cancelled() => {
                    return Err(RecoveryError::cancelled(error_type, attempt, CancelReason::Aborted));
                }
                _ = deadline_elapsed(deadline) => {
                    return Err(RecoveryError::cancelled(error_type, attempt, CancelReason::DeadlineExceeded));
                }
                _ = sleep(delay) => {}
            }
        }

        let last_error = last_error.unwrap_or_else(|| {
            ErrorRecord::new(error_type, "maximum retry attempts exceeded")
                .with_context(context.error_context())
        });

        if let Some(value) = self
            .try_alternatives(error_type, &config, &last_error, context, deadline, attempt)
            .await?
        {
            return Ok(value);
        }

        Err(RecoveryError::operation_failed(error_type, attempt, last_error))
    }

    /// At most one fallback, then at most one degradation attempt.
    async fn try_alternatives<T: 'static>(
        &self,
        error_type: ErrorType,
        config: &RecoveryStrategyConfig,
        last_error: &ErrorRecord,
        context: &RecoveryContext,
        deadline: Option<Instant>,
        attempts: u32,
    ) -> RecoveryResult<Option<T>> {
        let avenues = [
            (AlternativeKind::Fallback, config.fallback_enabled),
            (AlternativeKind::Degradation, config.graceful_degradation),
        ];

        for (kind, enabled) in avenues {
            if !enabled {
                continue;
            }
            check_cancelled(error_type, attempts, context, deadline)?;

            let Some(alternative) = self.alternatives.get::<T>(error_type, kind) else {
                log_debug!(error_type = %error_type, kind = ?kind, "No recovery alternative registered");
                continue;
            };

            let outcome = tokio::select! {
                biased;
                _ = context.cancellation.cancelled() => {
                    return Err(RecoveryError::cancelled(error_type, attempts, CancelReason::Aborted));
                }
                _ = deadline_elapsed(deadline) => {
                    return Err(RecoveryError::cancelled(error_type, attempts, CancelReason::DeadlineExceeded));
                }
                outcome = alternative.attempt(last_error, context) => outcome,
            };

            match outcome {
                Some(Ok(value)) => {
                    log_info!(error_type = %error_type, kind = ?kind, "Recovered through alternative");
                    return Ok(Some(value));
                }
                Some(Err(e)) => {
                    log_warn!(error_type = %error_type, kind = ?kind, error = %e, "Recovery alternative failed");
                }
                None => {
                    log_debug!(error_type = %error_type, kind = ?kind, "Recovery alternative declined");
                }
            }
        }

        Ok(None)
    }
}

fn check_cancelled(
    error_type: ErrorType,
    attempts: u32,
    context: &RecoveryContext,
    deadline: Option<Instant>,
) -> RecoveryResult<()> {
    if context.cancellation.is_cancelled() {
        return Err(RecoveryError::cancelled(
            error_type,
            attempts,
            CancelReason::Aborted,
        ));
    }
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(RecoveryError::cancelled(
            error_type,
            attempts,
            CancelReason::DeadlineExceeded,
        ));
    }
    Ok(())
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
