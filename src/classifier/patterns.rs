//! Named matchers that map failures onto known classifications.

use crate::core_types::{ErrorSeverity, ErrorType, RetryStrategy, UserImpact};
use crate::error::{RecoveryError, RecoveryResult};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Upper bound on compiled signature size, keeps hostile patterns cheap.
const SIGNATURE_SIZE_LIMIT: usize = 1 << 20;

/// Predicate over a record's metadata map.
#[derive(Clone)]
pub struct MetadataPredicate(Arc<dyn Fn(&HashMap<String, Value>) -> bool + Send + Sync>);

impl MetadataPredicate {
    pub fn new(f: impl Fn(&HashMap<String, Value>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Matches when `key` is present and equal to `expected`.
    pub fn equals(key: impl Into<String>, expected: impl Into<Value>) -> Self {
        let key = key.into();
        let expected = expected.into();
        Self::new(move |metadata| metadata.get(&key) == Some(&expected))
    }

    pub fn matches(&self, metadata: &HashMap<String, Value>) -> bool {
        (self.0)(metadata)
    }
}

impl fmt::Debug for MetadataPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetadataPredicate(..)")
    }
}

/// A registered matcher plus the classification it implies.
///
/// The signature is compiled case-insensitively. A signature that is not a
/// valid regex is matched literally.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub id: String,
    pub name: String,
    pub error_type: ErrorType,
    pub signature: String,
    pub metadata_predicate: Option<MetadataPredicate>,
    pub severity: ErrorSeverity,
    pub user_impact: UserImpact,
    pub retryable: bool,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    pub user_message: String,
    pub suggested_actions: Vec<String>,
    /// Shown to whoever resolves the failure by hand
    pub resolution_hint: Option<String>,
}

impl ErrorPattern {
    /// Pattern seeded with `error_type`'s defaults; refine with the builder methods.
    pub fn new(id: impl Into<String>, error_type: ErrorType, signature: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            error_type,
            signature: signature.into(),
            metadata_predicate: None,
            severity: error_type.default_severity(),
            user_impact: error_type.default_user_impact(),
            retryable: error_type.default_retryable(),
            max_retries: error_type.default_max_retries(),
            retry_strategy: if error_type.default_retryable() {
                RetryStrategy::Exponential
            } else {
                RetryStrategy::None
            },
            user_message: default_user_message(error_type).to_string(),
            suggested_actions: Vec::new(),
            resolution_hint: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn user_impact(mut self, user_impact: UserImpact) -> Self {
        self.user_impact = user_impact;
        self
    }

    /// Retry budget and shape. `RetryStrategy::None` also clears `retryable`.
    pub fn retry(mut self, max_retries: u32, strategy: RetryStrategy) -> Self {
        self.max_retries = max_retries;
        self.retry_strategy = strategy;
        self.retryable = strategy != RetryStrategy::None && max_retries > 0;
        self
    }

    pub fn not_retryable(self) -> Self {
        self.retry(0, RetryStrategy::None)
    }

    pub fn user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn suggest(mut self, action: impl Into<String>) -> Self {
        self.suggested_actions.push(action.into());
        self
    }

    pub fn resolution_hint(mut self, hint: impl Into<String>) -> Self {
        self.resolution_hint = Some(hint.into());
        self
    }

    pub fn when_metadata(mut self, predicate: MetadataPredicate) -> Self {
        self.metadata_predicate = Some(predicate);
        self
    }
}

/// A pattern together with its compiled signature.
#[derive(Debug, Clone)]
pub(crate) struct CompiledPattern {
    pub(crate) pattern: ErrorPattern,
    regex: Regex,
}

impl CompiledPattern {
    pub(crate) fn compile(pattern: ErrorPattern) -> RecoveryResult<Self> {
        if pattern.signature.trim().is_empty() {
            return Err(RecoveryError::invalid_pattern(format!(
                "pattern '{}' has an empty signature",
                pattern.id
            )));
        }

        let regex = build_regex(&pattern.signature)
            .or_else(|_| build_regex(&regex::escape(&pattern.signature)))
            .map_err(|e| {
                RecoveryError::invalid_pattern(format!(
                    "pattern '{}' signature cannot be compiled: {e}",
                    pattern.id
                ))
            })?;

        Ok(Self { pattern, regex })
    }

    /// Same error type, and either the signature or the metadata predicate matches.
    pub(crate) fn matches(
        &self,
        error_type: ErrorType,
        message: &str,
        metadata: &HashMap<String, Value>,
    ) -> bool {
        if self.pattern.error_type != error_type {
            return false;
        }
        self.regex.is_match(message)
            || self
                .pattern
                .metadata_predicate
                .as_ref()
                .is_some_and(|p| p.matches(metadata))
    }
}

fn build_regex(signature: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(signature)
        .case_insensitive(true)
        .size_limit(SIGNATURE_SIZE_LIMIT)
        .build()
}

/// Message shown when no pattern supplies one.
pub fn default_user_message(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::ToolExecution => "A tool the assistant was using failed to complete",
        ErrorType::ApiFailure => "An external service returned an error",
        ErrorType::NetworkError => "We couldn't reach an external service",
        ErrorType::RateLimit => "An external service is busy. We'll try again shortly",
        ErrorType::PermissionDenied => "The assistant doesn't have permission to do this",
        ErrorType::Validation => "Some of the provided information isn't valid",
        ErrorType::WorkspaceConnection => "Your connected workspace needs attention",
        ErrorType::Database => "We had trouble saving or loading your data",
        ErrorType::Timeout => "The operation took too long to complete",
        ErrorType::Unknown => "Something went wrong",
    }
}

/// Patterns every classifier built with defaults starts with, in match order.
pub fn default_patterns() -> Vec<ErrorPattern> {
    vec![
        ErrorPattern::new(
            "oauth_token_expired",
            ErrorType::WorkspaceConnection,
            r"(invalid_grant|token (has )?expired|refresh token)",
        )
        .name("OAuth token expired")
        .severity(ErrorSeverity::High)
        .user_impact(UserImpact::High)
        .not_retryable()
        .user_message("Your workspace connection has expired. Please reconnect it")
        .suggest("Reconnect the workspace from the integrations settings")
        .suggest("Make sure the connected account still has access")
        .resolution_hint("Re-run the OAuth flow for the affected integration"),
        ErrorPattern::new(
            "workspace_disconnected",
            ErrorType::WorkspaceConnection,
            r"(workspace|integration) (is )?(not connected|disconnected)",
        )
        .name("Workspace disconnected")
        .retry(2, RetryStrategy::Linear)
        .suggest("Reconnect the workspace from the integrations settings"),
        ErrorPattern::new(
            "http_forbidden",
            ErrorType::PermissionDenied,
            r"(\b403\b|forbidden|insufficient (permissions|scope)|access denied)",
        )
        .name("Permission denied")
        .severity(ErrorSeverity::High)
        .user_impact(UserImpact::High)
        .not_retryable()
        .suggest("Contact your administrator to request access")
        .suggest("Check that the connected account has the required permissions")
        .resolution_hint("Grant the missing scope or role to the connected account"),
        ErrorPattern::new(
            "http_rate_limited",
            ErrorType::RateLimit,
            r"(\b429\b|rate.?limit|too many requests|quota exceeded)",
        )
        .name("Rate limited")
        .severity(ErrorSeverity::Medium)
        .user_impact(UserImpact::Low)
        .retry(5, RetryStrategy::Exponential)
        .suggest("Wait a few minutes before trying again")
        .suggest("Reduce how often this automation runs"),
        ErrorPattern::new(
            "network_reset",
            ErrorType::NetworkError,
            r"(econnreset|econnrefused|enotfound|socket hang up|connection (reset|refused))",
        )
        .name("Network connection failure")
        .retry(3, RetryStrategy::Exponential)
        .suggest("Check your internet connection"),
        ErrorPattern::new(
            "request_timeout",
            ErrorType::Timeout,
            r"(timed? ?out|etimedout|deadline exceeded)",
        )
        .name("Request timeout")
        .retry(3, RetryStrategy::Exponential),
        ErrorPattern::new(
            "required_field_missing",
            ErrorType::Validation,
            r"(required field|is required|missing required|must not be empty)",
        )
        .name("Required field missing")
        .severity(ErrorSeverity::Low)
        .retry(1, RetryStrategy::Linear)
        .suggest("Fill in the missing fields and try again"),
        ErrorPattern::new(
            "database_unavailable",
            ErrorType::Database,
            r"(connection pool|too many connections|database (is )?(locked|unavailable))",
        )
        .name("Database unavailable")
        .severity(ErrorSeverity::High)
        .retry(3, RetryStrategy::Exponential)
        .resolution_hint("Check database connectivity and pool saturation"),
        ErrorPattern::new(
            "vendor_server_error",
            ErrorType::ApiFailure,
            r"(\b50[0234]\b|internal server error|bad gateway|service unavailable)",
        )
        .name("Vendor server error")
        .retry(3, RetryStrategy::Exponential)
        .suggest("Check the external service's status page"),
    ]
}
