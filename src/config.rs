use crate::core_types::{ErrorType, RetryStrategy};
use crate::error::{RecoveryError, RecoveryResult};
use crate::logging::log_debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Cool-down applied to an agent once it crosses its escalation threshold.
pub const DEFAULT_THROTTLE_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Retry, backoff and circuit-breaker policy for one error type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategyConfig {
    /// Maximum number of attempts `execute_with_recovery` makes
    pub max_retries: u32,
    /// Delay unit for LINEAR and EXPONENTIAL backoff
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay
    pub max_delay: Duration,
    /// Growth factor for EXPONENTIAL backoff
    pub backoff_multiplier: f64,
    pub strategy: RetryStrategy,
    /// Failures inside one window that open the breaker
    pub circuit_breaker_threshold: u32,
    /// Evaluation window, and how long an opened breaker stays open
    pub circuit_breaker_window: Duration,
    pub fallback_enabled: bool,
    pub graceful_degradation: bool,
}

impl Default for RecoveryStrategyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            strategy: RetryStrategy::Exponential,
            circuit_breaker_threshold: 5,
            circuit_breaker_window: Duration::from_secs(5 * 60),
            fallback_enabled: false,
            graceful_degradation: false,
        }
    }
}

impl RecoveryStrategyConfig {
    /// Built-in policy for `error_type`, or `None` when the generic default applies.
    pub fn builtin(error_type: ErrorType) -> Option<Self> {
        let default = Self::default();
        let config = match error_type {
            ErrorType::RateLimit => Self {
                max_retries: 5,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(60),
                ..default
            },
            ErrorType::NetworkError | ErrorType::Timeout => Self {
                max_delay: Duration::from_secs(10),
                ..default
            },
            ErrorType::ApiFailure => Self {
                fallback_enabled: true,
                ..default
            },
            ErrorType::ToolExecution => Self {
                max_retries: 2,
                fallback_enabled: true,
                ..default
            },
            ErrorType::WorkspaceConnection => Self {
                max_retries: 2,
                base_delay: Duration::from_secs(2),
                strategy: RetryStrategy::Linear,
                graceful_degradation: true,
                ..default
            },
            ErrorType::Database => Self {
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                ..default
            },
            ErrorType::Validation => Self {
                max_retries: 1,
                strategy: RetryStrategy::Linear,
                ..default
            },
            ErrorType::PermissionDenied => Self {
                max_retries: 0,
                strategy: RetryStrategy::None,
                ..default
            },
            ErrorType::Unknown => return None,
        };
        Some(config)
    }

    /// Validate the policy
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if:
    /// - `backoff_multiplier` is below 1 or not finite
    /// - `base_delay` exceeds `max_delay`
    /// - the breaker threshold or window is zero
    pub fn validate(&self) -> RecoveryResult<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(RecoveryError::configuration_error(format!(
                "backoff_multiplier must be >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(RecoveryError::configuration_error(format!(
                "base_delay ({}ms) exceeds max_delay ({}ms)",
                self.base_delay.as_millis(),
                self.max_delay.as_millis()
            )));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(RecoveryError::configuration_error(
                "circuit_breaker_threshold must be greater than 0",
            ));
        }
        if self.circuit_breaker_window.is_zero() {
            return Err(RecoveryError::configuration_error(
                "circuit_breaker_window must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Per-agent error handling switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorConfig {
    pub enable_error_recovery: bool,
    pub enable_user_notifications: bool,
    /// Handled errors after which the agent is throttled and escalated
    pub escalate_after_failures: u32,
}

impl Default for AgentErrorConfig {
    fn default() -> Self {
        Self {
            enable_error_recovery: true,
            enable_user_notifications: true,
            escalate_after_failures: 5,
        }
    }
}

impl AgentErrorConfig {
    /// Copy of `self` with every field set in `overrides` replaced.
    pub fn merged(&self, overrides: &AgentErrorConfigOverrides) -> Self {
        Self {
            enable_error_recovery: overrides
                .enable_error_recovery
                .unwrap_or(self.enable_error_recovery),
            enable_user_notifications: overrides
                .enable_user_notifications
                .unwrap_or(self.enable_user_notifications),
            escalate_after_failures: overrides
                .escalate_after_failures
                .unwrap_or(self.escalate_after_failures),
        }
    }
}

/// Partial [`AgentErrorConfig`] supplied when an agent registers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorConfigOverrides {
    pub enable_error_recovery: Option<bool>,
    pub enable_user_notifications: Option<bool>,
    pub escalate_after_failures: Option<u32>,
}

/// Configuration for the whole recovery core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryCoreConfig {
    /// Policy for error types without an entry in `strategies`
    pub default_strategy: RecoveryStrategyConfig,
    pub strategies: HashMap<ErrorType, RecoveryStrategyConfig>,
    /// Defaults every agent registration is merged onto
    pub agent_defaults: AgentErrorConfig,
    pub throttle_cooldown: Duration,
}

impl Default for RecoveryCoreConfig {
    fn default() -> Self {
        let strategies = ErrorType::ALL
            .iter()
            .filter_map(|t| RecoveryStrategyConfig::builtin(*t).map(|c| (*t, c)))
            .collect();

        Self {
            default_strategy: RecoveryStrategyConfig::default(),
            strategies,
            agent_defaults: AgentErrorConfig::default(),
            throttle_cooldown: DEFAULT_THROTTLE_COOLDOWN,
        }
    }
}

impl RecoveryCoreConfig {
    /// Policy that applies to `error_type`
    pub fn strategy_for(&self, error_type: ErrorType) -> &RecoveryStrategyConfig {
        self.strategies
            .get(&error_type)
            .unwrap_or(&self.default_strategy)
    }

    /// Validate every policy and the agent defaults
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] naming the first invalid entry.
    pub fn validate(&self) -> RecoveryResult<()> {
        self.default_strategy.validate().map_err(|e| {
            RecoveryError::configuration_error(format!("default strategy: {e}"))
        })?;

        for (error_type, strategy) in &self.strategies {
            strategy.validate().map_err(|e| {
                RecoveryError::configuration_error(format!("{error_type} strategy: {e}"))
            })?;
        }

        if self.agent_defaults.escalate_after_failures == 0 {
            return Err(RecoveryError::configuration_error(
                "escalate_after_failures must be greater than 0",
            ));
        }
        if self.throttle_cooldown.is_zero() {
            return Err(RecoveryError::configuration_error(
                "throttle_cooldown must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Load configuration from environment variables, applied over the defaults
    /// This is the ONLY method that should access environment variables
    ///
    /// Recognised variables: `RECOVERY_MAX_RETRIES`, `RECOVERY_BASE_DELAY_MS`,
    /// `RECOVERY_MAX_DELAY_MS`, `RECOVERY_BACKOFF_MULTIPLIER`,
    /// `RECOVERY_CIRCUIT_THRESHOLD`, `RECOVERY_CIRCUIT_WINDOW_MINUTES`,
    /// `AGENT_ESCALATE_AFTER_FAILURES`, `AGENT_THROTTLE_COOLDOWN_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if the resulting configuration
    /// fails [`validate`](Self::validate).
    pub fn from_env() -> RecoveryResult<Self> {
        let section: HashMap<String, String> = ENV_KEYS
            .iter()
            .filter_map(|(env_key, key)| {
                std::env::var(env_key)
                    .ok()
                    .map(|value| (key.to_string(), value))
            })
            .collect();

        log_debug!(
            overrides = section.len(),
            "Loading recovery configuration from environment"
        );

        Self::from_sections(&section)
    }

    /// Create configuration from a parsed config section
    ///
    /// Keys are the lowercase forms of the environment variables without
    /// their prefix (`max_retries`, `base_delay_ms`, ...). Unparsable values
    /// are ignored and the default is kept.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if the resulting configuration
    /// fails [`validate`](Self::validate).
    pub fn from_sections(section: &HashMap<String, String>) -> RecoveryResult<Self> {
        let mut config = Self::default();
        config.apply_default_strategy_params(section);

        if let Some(n) = parse_param::<u32>(section, "escalate_after_failures") {
            config.agent_defaults.escalate_after_failures = n;
        }
        if let Some(secs) = parse_param::<u64>(section, "throttle_cooldown_secs") {
            config.throttle_cooldown = Duration::from_secs(secs);
        }

        config.validate()?;

        log_debug!(
            max_retries = config.default_strategy.max_retries,
            circuit_threshold = config.default_strategy.circuit_breaker_threshold,
            escalate_after_failures = config.agent_defaults.escalate_after_failures,
            "Recovery configuration loaded and validated"
        );

        Ok(config)
    }

    fn apply_default_strategy_params(&mut self, section: &HashMap<String, String>) {
        let strategy = &mut self.default_strategy;
        if let Some(n) = parse_param::<u32>(section, "max_retries") {
            strategy.max_retries = n;
        }
        if let Some(ms) = parse_param::<u64>(section, "base_delay_ms") {
            strategy.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_param::<u64>(section, "max_delay_ms") {
            strategy.max_delay = Duration::from_millis(ms);
        }
        if let Some(m) = parse_param::<f64>(section, "backoff_multiplier") {
            strategy.backoff_multiplier = m;
        }
        if let Some(n) = parse_param::<u32>(section, "circuit_threshold") {
            strategy.circuit_breaker_threshold = n;
        }
        if let Some(minutes) = parse_param::<u64>(section, "circuit_window_minutes") {
            strategy.circuit_breaker_window = Duration::from_secs(minutes.saturating_mul(60));
        }
    }
}

const ENV_KEYS: [(&str, &str); 8] = [
    ("RECOVERY_MAX_RETRIES", "max_retries"),
    ("RECOVERY_BASE_DELAY_MS", "base_delay_ms"),
    ("RECOVERY_MAX_DELAY_MS", "max_delay_ms"),
    ("RECOVERY_BACKOFF_MULTIPLIER", "backoff_multiplier"),
    ("RECOVERY_CIRCUIT_THRESHOLD", "circuit_threshold"),
    ("RECOVERY_CIRCUIT_WINDOW_MINUTES", "circuit_window_minutes"),
    ("AGENT_ESCALATE_AFTER_FAILURES", "escalate_after_failures"),
    ("AGENT_THROTTLE_COOLDOWN_SECS", "throttle_cooldown_secs"),
];

/// Parse a parameter from the section HashMap
fn parse_param<T: std::str::FromStr>(section: &HashMap<String, String>, key: &str) -> Option<T> {
    section.get(key).and_then(|s| s.trim().parse::<T>().ok())
}
