//! Pattern-based error classification.
//!
//! [`ErrorClassifier`] turns an [`ErrorRecord`] into a [`ClassificationResult`]:
//!
//! 1. The first registered pattern (registration order) whose error type
//!    matches and whose signature or metadata predicate matches seeds the
//!    result with confidence 90. Without a match the record's own fields seed
//!    it with confidence 30–50.
//! 2. Context signals adjust it: critical system health escalates severity,
//!    frequent errors halve the retry budget and force exponential backoff,
//!    off-hours lower user impact, high agent load trims retries by ~30%.
//! 3. Suggestions and an estimated resolution time are filled in.
//!
//! `classify` never fails: internal errors (and panics in a telemetry
//! provider) degrade to [`ClassificationResult::fallback`].

pub mod context;
pub mod patterns;

use crate::core_types::{ErrorRecord, ErrorSeverity, ErrorType, RetryStrategy, UserImpact};
use crate::error::{RecoveryError, RecoveryResult};
use crate::logging::{log_debug, log_error};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

pub use context::{
    AgentLoad, ContextAnalysis, ErrorFrequency, StaticTelemetry, SystemHealth, TelemetryProvider,
    TimeContext, UserActivity,
};
pub use patterns::{ErrorPattern, MetadataPredicate};

use patterns::CompiledPattern;

/// Confidence when a registered pattern matched.
pub const PATTERN_CONFIDENCE: u8 = 90;

/// Built-in patterns, compiled once per process.
static DEFAULT_PATTERNS: Lazy<Vec<CompiledPattern>> = Lazy::new(|| {
    patterns::default_patterns()
        .into_iter()
        .filter_map(|p| CompiledPattern::compile(p).ok())
        .collect()
});

/// The classifier's structured verdict on an [`ErrorRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub error_type: ErrorType,
    pub severity: ErrorSeverity,
    pub user_impact: UserImpact,
    pub retryable: bool,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    pub user_message: String,
    /// Ordered, most useful first
    pub suggested_actions: Vec<String>,
    pub estimated_resolution_minutes: u32,
    /// 0..=100
    pub confidence: u8,
    /// Id of the pattern that seeded this result
    pub matched_pattern: Option<String>,
    pub resolution_hint: Option<String>,
    pub context: ContextAnalysis,
}

impl ClassificationResult {
    fn from_pattern(record: &ErrorRecord, pattern: &ErrorPattern) -> Self {
        Self {
            error_type: record.error_type,
            severity: pattern.severity,
            user_impact: pattern.user_impact,
            retryable: pattern.retryable,
            max_retries: pattern.max_retries,
            retry_strategy: pattern.retry_strategy,
            user_message: pattern.user_message.clone(),
            suggested_actions: pattern.suggested_actions.clone(),
            estimated_resolution_minutes: 0,
            confidence: PATTERN_CONFIDENCE,
            matched_pattern: Some(pattern.id.clone()),
            resolution_hint: pattern.resolution_hint.clone(),
            context: ContextAnalysis::neutral(),
        }
    }

    fn from_record(record: &ErrorRecord) -> Self {
        let mut confidence = 30;
        if record.error_type != ErrorType::Unknown {
            confidence += 10;
        }
        if !record.message.trim().is_empty() {
            confidence += 10;
        }

        let retry_strategy = if !record.retryable || record.max_retries == 0 {
            RetryStrategy::None
        } else if record.error_type == ErrorType::Validation {
            RetryStrategy::Linear
        } else {
            RetryStrategy::Exponential
        };

        Self {
            error_type: record.error_type,
            severity: record.severity,
            user_impact: record.user_impact,
            retryable: record.retryable,
            max_retries: record.max_retries,
            retry_strategy,
            user_message: patterns::default_user_message(record.error_type).to_string(),
            suggested_actions: Vec::new(),
            estimated_resolution_minutes: 0,
            confidence,
            matched_pattern: None,
            resolution_hint: None,
            context: ContextAnalysis::neutral(),
        }
    }

    /// Minimal classification used when classifying itself failed.
    pub fn fallback(record: &ErrorRecord) -> Self {
        Self {
            error_type: record.error_type,
            severity: ErrorSeverity::Medium,
            user_impact: UserImpact::Medium,
            retryable: false,
            max_retries: 0,
            retry_strategy: RetryStrategy::None,
            user_message: patterns::default_user_message(ErrorType::Unknown).to_string(),
            suggested_actions: default_suggestions(ErrorType::Unknown),
            estimated_resolution_minutes: base_resolution_minutes(ErrorSeverity::Medium),
            confidence: 10,
            matched_pattern: None,
            resolution_hint: None,
            context: ContextAnalysis::neutral(),
        }
    }

    fn apply_context(&mut self, context: &ContextAnalysis) {
        if context.system_health == SystemHealth::Critical {
            self.severity = self.severity.escalate();
        }

        if context.error_frequency == ErrorFrequency::Frequent && self.retryable {
            self.max_retries = (self.max_retries / 2).max(1);
            self.retry_strategy = RetryStrategy::Exponential;
        }

        if context.time_context.is_off_hours() {
            self.user_impact = self.user_impact.step_down();
        }

        if context.agent_load == AgentLoad::High {
            // 70%, rounded half up
            self.max_retries = self.max_retries.saturating_mul(7).saturating_add(5) / 10;
        }

        self.context = *context;
    }
}

/// Type-specific advice used when the matched pattern supplies none.
pub fn default_suggestions(error_type: ErrorType) -> Vec<String> {
    let actions: &[&str] = match error_type {
        ErrorType::PermissionDenied => &[
            "Contact your administrator to request access",
            "Check that the connected account has the required permissions",
        ],
        ErrorType::RateLimit => &[
            "Wait a few minutes before trying again",
            "Reduce how often this automation runs",
        ],
        ErrorType::NetworkError => &[
            "Check your internet connection",
            "Try again in a moment",
        ],
        ErrorType::Timeout => &[
            "Try again in a moment",
            "Split large requests into smaller ones",
        ],
        ErrorType::Validation => &[
            "Review the information you provided",
            "Make sure all required fields are filled in",
        ],
        ErrorType::WorkspaceConnection => &[
            "Reconnect the workspace from the integrations settings",
            "Check the integration's settings",
        ],
        ErrorType::Database => &[
            "Try again shortly",
            "Contact support if the problem persists",
        ],
        ErrorType::ApiFailure => &[
            "Check the external service's status page",
            "Try again later",
        ],
        ErrorType::ToolExecution => &[
            "Try the task again",
            "Check the tool's configuration",
        ],
        ErrorType::Unknown => &["Try again later", "Contact support if the problem persists"],
    };
    actions.iter().map(|s| s.to_string()).collect()
}

/// Minutes to resolution before context scaling.
pub fn base_resolution_minutes(severity: ErrorSeverity) -> u32 {
    match severity {
        ErrorSeverity::Low => 2,
        ErrorSeverity::Medium => 10,
        ErrorSeverity::High => 30,
        ErrorSeverity::Critical => 60,
        ErrorSeverity::Emergency => 180,
    }
}

/// Severity base scaled up for poor health, frequent errors and off-hours.
pub fn estimate_resolution_minutes(severity: ErrorSeverity, context: &ContextAnalysis) -> u32 {
    let mut factor = 1.0_f64;
    factor *= match context.system_health {
        SystemHealth::Healthy => 1.0,
        SystemHealth::Degraded => 1.5,
        SystemHealth::Critical => 2.0,
    };
    if context.error_frequency == ErrorFrequency::Frequent {
        factor *= 1.5;
    }
    if context.time_context.is_off_hours() {
        factor *= 2.0;
    }
    (f64::from(base_resolution_minutes(severity)) * factor).ceil() as u32
}

/// Classifies failures against an ordered pattern registry
pub struct ErrorClassifier {
    patterns: RwLock<Vec<CompiledPattern>>,
    telemetry: Arc<dyn TelemetryProvider>,
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("patterns", &self.pattern_ids())
            .finish_non_exhaustive()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::with_default_patterns(Arc::new(StaticTelemetry::default()))
    }
}

impl ErrorClassifier {
    /// Classifier with an empty registry
    pub fn new(telemetry: Arc<dyn TelemetryProvider>) -> Self {
        Self {
            patterns: RwLock::new(Vec::new()),
            telemetry,
        }
    }

    /// Classifier pre-loaded with the built-in patterns
    pub fn with_default_patterns(telemetry: Arc<dyn TelemetryProvider>) -> Self {
        Self {
            patterns: RwLock::new(DEFAULT_PATTERNS.clone()),
            telemetry,
        }
    }

    /// Insert a pattern, or replace the one with the same id in place.
    ///
    /// Replacing keeps the original registration position.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidPattern`] if the signature is empty.
    pub fn register_pattern(&self, pattern: ErrorPattern) -> RecoveryResult<()> {
        let compiled = CompiledPattern::compile(pattern)?;
        let mut patterns = self
            .patterns
            .write()
            .map_err(|_| RecoveryError::internal("pattern registry lock poisoned"))?;

        let id = compiled.pattern.id.clone();
        match patterns.iter().position(|p| p.pattern.id == id) {
            Some(index) => patterns[index] = compiled,
            None => patterns.push(compiled),
        }

        log_debug!(pattern_id = %id, registered = patterns.len(), "Error pattern registered");
        Ok(())
    }

    /// Remove a pattern by id, returning whether it existed.
    pub fn unregister_pattern(&self, id: &str) -> bool {
        match self.patterns.write() {
            Ok(mut patterns) => {
                let before = patterns.len();
                patterns.retain(|p| p.pattern.id != id);
                patterns.len() != before
            }
            Err(_) => false,
        }
    }

    /// Registered pattern ids in match order.
    pub fn pattern_ids(&self) -> Vec<String> {
        self.patterns
            .read()
            .map(|patterns| patterns.iter().map(|p| p.pattern.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Context signals for `record`.
    pub fn analyze_context(&self, record: &ErrorRecord) -> ContextAnalysis {
        context::analyze(record, self.telemetry.as_ref())
    }

    /// Classify `record`. Never fails.
    pub fn classify(&self, record: &ErrorRecord) -> ClassificationResult {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_classify(record))) {
            Ok(Ok(result)) => {
                log_debug!(
                    error_id = %record.id,
                    error_type = %result.error_type,
                    severity = %result.severity,
                    confidence = result.confidence,
                    matched_pattern = ?result.matched_pattern,
                    "Error classified"
                );
                result
            }
            Ok(Err(e)) => {
                log_error!(error_id = %record.id, error = %e, "Classification failed, using fallback");
                ClassificationResult::fallback(record)
            }
            Err(_) => {
                log_error!(error_id = %record.id, "Classification panicked, using fallback");
                ClassificationResult::fallback(record)
            }
        }
    }

    fn try_classify(&self, record: &ErrorRecord) -> RecoveryResult<ClassificationResult> {
        let matched = {
            let patterns = self
                .patterns
                .read()
                .map_err(|_| RecoveryError::internal("pattern registry lock poisoned"))?;
            patterns
                .iter()
                .find(|p| p.matches(record.error_type, &record.message, &record.metadata))
                .map(|p| p.pattern.clone())
        };

        let mut result = match &matched {
            Some(pattern) => ClassificationResult::from_pattern(record, pattern),
            None => ClassificationResult::from_record(record),
        };

        let context = self.analyze_context(record);
        result.apply_context(&context);

        if result.suggested_actions.is_empty() {
            result.suggested_actions = default_suggestions(record.error_type);
        }
        if result.severity.requires_escalation() {
            result
                .suggested_actions
                .push("This issue has been escalated to the support team".to_string());
        }

        result.estimated_resolution_minutes =
            estimate_resolution_minutes(result.severity, &context);
        result.confidence = result.confidence.min(100);

        Ok(result)
    }
}
