// Unit Tests for Recovery Configuration
//
// UNIT UNDER TEST: RecoveryStrategyConfig, AgentErrorConfig, RecoveryCoreConfig
//
// BUSINESS RESPONSIBILITY:
//   - Supplies the generic default retry policy and built-in per-type policies
//   - Rejects inconsistent policies before they reach the recovery manager
//   - Merges per-agent overrides onto agent defaults
//   - Loads overrides from a parsed config section
//
// TEST COVERAGE:
//   - Default policy values
//   - Built-in policies for each error type family
//   - Validation rules and their error kind
//   - Override merging
//   - Section parsing, including unparsable values

use crate::config::{
    AgentErrorConfig, AgentErrorConfigOverrides, RecoveryCoreConfig, RecoveryStrategyConfig,
    DEFAULT_THROTTLE_COOLDOWN,
};
use crate::core_types::{ErrorType, RetryStrategy};
use crate::error::RecoveryError;
use std::collections::HashMap;
use std::time::Duration;

#[cfg(test)]
mod strategy_default_tests {
    use super::*;

    #[test]
    fn test_default_strategy_values() {
        // Test verifies the generic policy used for unregistered error types

        // Arrange & Act
        let config = RecoveryStrategyConfig::default();

        // Assert
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(30_000));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.strategy, RetryStrategy::Exponential);
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.circuit_breaker_window, Duration::from_secs(300));
        assert!(!config.fallback_enabled);
        assert!(!config.graceful_degradation);
    }

    #[test]
    fn test_builtin_permission_denied_never_retries() {
        // Arrange & Act
        let config = RecoveryStrategyConfig::builtin(ErrorType::PermissionDenied).unwrap();

        // Assert
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.strategy, RetryStrategy::None);
    }

    #[test]
    fn test_builtin_validation_allows_one_linear_retry() {
        // Arrange & Act
        let config = RecoveryStrategyConfig::builtin(ErrorType::Validation).unwrap();

        // Assert
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.strategy, RetryStrategy::Linear);
    }

    #[test]
    fn test_builtin_external_failures_enable_alternatives() {
        // Arrange & Act
        let api = RecoveryStrategyConfig::builtin(ErrorType::ApiFailure).unwrap();
        let workspace = RecoveryStrategyConfig::builtin(ErrorType::WorkspaceConnection).unwrap();

        // Assert
        assert!(api.fallback_enabled);
        assert!(workspace.graceful_degradation);
    }

    #[test]
    fn test_unknown_type_uses_generic_default() {
        // Arrange
        let config = RecoveryCoreConfig::default();

        // Act & Assert
        assert!(RecoveryStrategyConfig::builtin(ErrorType::Unknown).is_none());
        assert_eq!(
            config.strategy_for(ErrorType::Unknown),
            &RecoveryStrategyConfig::default()
        );
    }

    #[test]
    fn test_every_builtin_strategy_is_valid() {
        // Arrange
        let config = RecoveryCoreConfig::default();

        // Act & Assert
        assert!(config.validate().is_ok());
        for error_type in ErrorType::ALL {
            assert!(config.strategy_for(error_type).validate().is_ok());
        }
    }
}

#[cfg(test)]
mod strategy_validation_tests {
    use super::*;

    #[test]
    fn test_multiplier_below_one_rejected() {
        // Arrange
        let config = RecoveryStrategyConfig {
            backoff_multiplier: 0.5,
            ..RecoveryStrategyConfig::default()
        };

        // Act
        let result = config.validate();

        // Assert
        assert!(matches!(result, Err(RecoveryError::Configuration { .. })));
    }

    #[test]
    fn test_non_finite_multiplier_rejected() {
        // Arrange
        let config = RecoveryStrategyConfig {
            backoff_multiplier: f64::NAN,
            ..RecoveryStrategyConfig::default()
        };

        // Act & Assert
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_delay_above_max_rejected() {
        // Arrange
        let config = RecoveryStrategyConfig {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(10),
            ..RecoveryStrategyConfig::default()
        };

        // Act & Assert
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_and_window_rejected() {
        // Arrange
        let no_threshold = RecoveryStrategyConfig {
            circuit_breaker_threshold: 0,
            ..RecoveryStrategyConfig::default()
        };
        let no_window = RecoveryStrategyConfig {
            circuit_breaker_window: Duration::ZERO,
            ..RecoveryStrategyConfig::default()
        };

        // Act & Assert
        assert!(no_threshold.validate().is_err());
        assert!(no_window.validate().is_err());
    }

    #[test]
    fn test_core_config_rejects_zero_escalation_threshold() {
        // Arrange
        let mut config = RecoveryCoreConfig::default();
        config.agent_defaults.escalate_after_failures = 0;

        // Act
        let result = config.validate();

        // Assert
        assert!(matches!(result, Err(RecoveryError::Configuration { .. })));
    }
}

#[cfg(test)]
mod agent_config_tests {
    use super::*;

    #[test]
    fn test_agent_defaults() {
        // Arrange & Act
        let config = AgentErrorConfig::default();

        // Assert
        assert!(config.enable_error_recovery);
        assert!(config.enable_user_notifications);
        assert_eq!(config.escalate_after_failures, 5);
    }

    #[test]
    fn test_overrides_replace_only_set_fields() {
        // Test verifies registration merges overrides onto defaults field by field

        // Arrange
        let defaults = AgentErrorConfig::default();
        let overrides = AgentErrorConfigOverrides {
            enable_user_notifications: Some(false),
            escalate_after_failures: Some(3),
            ..AgentErrorConfigOverrides::default()
        };

        // Act
        let merged = defaults.merged(&overrides);

        // Assert
        assert!(merged.enable_error_recovery);
        assert!(!merged.enable_user_notifications);
        assert_eq!(merged.escalate_after_failures, 3);
    }

    #[test]
    fn test_empty_overrides_keep_defaults() {
        // Arrange
        let defaults = AgentErrorConfig::default();

        // Act
        let merged = defaults.merged(&AgentErrorConfigOverrides::default());

        // Assert
        assert_eq!(merged, defaults);
    }
}

#[cfg(test)]
mod config_section_tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_section_values_override_defaults() {
        // Arrange
        let values = section(&[
            ("max_retries", "4"),
            ("base_delay_ms", " 250 "),
            ("circuit_window_minutes", "2"),
            ("escalate_after_failures", "7"),
            ("throttle_cooldown_secs", "60"),
        ]);

        // Act
        let config = RecoveryCoreConfig::from_sections(&values).unwrap();

        // Assert
        assert_eq!(config.default_strategy.max_retries, 4);
        assert_eq!(config.default_strategy.base_delay, Duration::from_millis(250));
        assert_eq!(
            config.default_strategy.circuit_breaker_window,
            Duration::from_secs(120)
        );
        assert_eq!(config.agent_defaults.escalate_after_failures, 7);
        assert_eq!(config.throttle_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_unparsable_values_are_ignored() {
        // Arrange
        let values = section(&[("max_retries", "lots"), ("backoff_multiplier", "fast")]);

        // Act
        let config = RecoveryCoreConfig::from_sections(&values).unwrap();

        // Assert
        assert_eq!(config.default_strategy.max_retries, 3);
        assert_eq!(config.default_strategy.backoff_multiplier, 2.0);
        assert_eq!(config.throttle_cooldown, DEFAULT_THROTTLE_COOLDOWN);
    }

    #[test]
    fn test_section_producing_invalid_config_is_rejected() {
        // Arrange
        let values = section(&[("base_delay_ms", "90000"), ("max_delay_ms", "1000")]);

        // Act
        let result = RecoveryCoreConfig::from_sections(&values);

        // Assert
        assert!(matches!(result, Err(RecoveryError::Configuration { .. })));
    }
}
