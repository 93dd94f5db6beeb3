//! Deterministic backoff delays.

use crate::config::RecoveryStrategyConfig;
use crate::core_types::RetryStrategy;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based).
///
/// - IMMEDIATE / NONE: zero
/// - LINEAR: `min(base_delay * attempt, max_delay)`
/// - EXPONENTIAL: `min(base_delay * multiplier^(attempt - 1), max_delay)`
///
/// No jitter is applied, so the same inputs always give the same delay.
pub fn calculate_delay(attempt: u32, config: &RecoveryStrategyConfig) -> Duration {
    let base_ns = config.base_delay.as_nanos() as f64;
    let max_ns = config.max_delay.as_nanos() as f64;

    let delay_ns = match config.strategy {
        RetryStrategy::Immediate | RetryStrategy::None => return Duration::ZERO,
        RetryStrategy::Linear => base_ns * f64::from(attempt),
        RetryStrategy::Exponential => {
            let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
            base_ns * config.backoff_multiplier.powi(exponent)
        }
    };

    // Overflowing growth lands on the cap rather than NaN/inf
    let capped = if delay_ns.is_finite() {
        delay_ns.min(max_ns)
    } else {
        max_ns
    };

    Duration::from_nanos(capped.max(0.0).round() as u64)
}
