// Unit Tests for Backoff Delay Calculation
//
// UNIT UNDER TEST: calculate_delay
//
// BUSINESS RESPONSIBILITY:
//   - Maps a retry attempt number to the delay before it
//   - Never exceeds the configured maximum delay
//   - Gives the same answer for the same inputs
//
// TEST COVERAGE:
//   - Zero delay for IMMEDIATE and NONE
//   - Linear and exponential growth
//   - Capping at max_delay, including overflow-sized exponents
//   - Monotonicity of exponential delays

use crate::config::RecoveryStrategyConfig;
use crate::core_types::RetryStrategy;
use crate::recovery::calculate_delay;
use std::time::Duration;

fn config(strategy: RetryStrategy) -> RecoveryStrategyConfig {
    RecoveryStrategyConfig {
        strategy,
        base_delay: Duration::from_millis(1000),
        max_delay: Duration::from_millis(30_000),
        backoff_multiplier: 2.0,
        ..RecoveryStrategyConfig::default()
    }
}

#[cfg(test)]
mod delay_shape_tests {
    use super::*;

    #[test]
    fn test_immediate_and_none_are_zero() {
        // Arrange
        let immediate = config(RetryStrategy::Immediate);
        let none = config(RetryStrategy::None);

        // Act & Assert
        for attempt in [1, 2, 10] {
            assert_eq!(calculate_delay(attempt, &immediate), Duration::ZERO);
            assert_eq!(calculate_delay(attempt, &none), Duration::ZERO);
        }
    }

    #[test]
    fn test_linear_grows_by_base_delay() {
        // Arrange
        let linear = config(RetryStrategy::Linear);

        // Act & Assert
        assert_eq!(calculate_delay(1, &linear), Duration::from_millis(1000));
        assert_eq!(calculate_delay(2, &linear), Duration::from_millis(2000));
        assert_eq!(calculate_delay(5, &linear), Duration::from_millis(5000));
        assert_eq!(calculate_delay(45, &linear), Duration::from_millis(30_000));
    }

    #[test]
    fn test_exponential_doubles_from_base() {
        // Arrange
        let exponential = config(RetryStrategy::Exponential);

        // Act & Assert
        assert_eq!(calculate_delay(1, &exponential), Duration::from_millis(1000));
        assert_eq!(calculate_delay(2, &exponential), Duration::from_millis(2000));
        assert_eq!(calculate_delay(3, &exponential), Duration::from_millis(4000));
        assert_eq!(calculate_delay(4, &exponential), Duration::from_millis(8000));
    }

    #[test]
    fn test_fractional_multiplier() {
        // Arrange
        let exponential = RecoveryStrategyConfig {
            backoff_multiplier: 1.5,
            ..config(RetryStrategy::Exponential)
        };

        // Act & Assert
        assert_eq!(calculate_delay(3, &exponential), Duration::from_millis(2250));
    }
}

#[cfg(test)]
mod delay_cap_tests {
    use super::*;

    #[test]
    fn test_exponential_is_capped() {
        // Arrange
        let exponential = config(RetryStrategy::Exponential);

        // Act & Assert
        assert_eq!(calculate_delay(6, &exponential), Duration::from_millis(30_000));
        assert_eq!(calculate_delay(60, &exponential), Duration::from_millis(30_000));
    }

    #[test]
    fn test_huge_attempt_numbers_stay_at_cap() {
        // Test verifies overflowing growth never panics or wraps

        // Arrange
        let exponential = config(RetryStrategy::Exponential);

        // Act
        let delay = calculate_delay(u32::MAX, &exponential);

        // Assert
        assert_eq!(delay, Duration::from_millis(30_000));
    }

    #[test]
    fn test_exponential_is_non_decreasing() {
        // Arrange
        let exponential = config(RetryStrategy::Exponential);

        // Act
        let delays: Vec<_> = (1..=20).map(|a| calculate_delay(a, &exponential)).collect();

        // Assert
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= exponential.max_delay));
    }

    #[test]
    fn test_same_inputs_same_delay() {
        // Arrange
        let exponential = config(RetryStrategy::Exponential);

        // Act & Assert
        assert_eq!(
            calculate_delay(3, &exponential),
            calculate_delay(3, &exponential)
        );
    }
}
