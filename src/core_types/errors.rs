//! Closed taxonomy shared by the classifier, the recovery manager and the
//! agent integration layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of failure an agent operation ran into.
///
/// The set is closed: anything that cannot be typed more precisely becomes
/// [`ErrorType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// A tool invoked by the agent failed while running
    ToolExecution,
    /// A third-party API answered with an error
    ApiFailure,
    /// Connection reset, DNS failure, unreachable host
    NetworkError,
    /// The remote side is throttling us
    RateLimit,
    /// Credentials are valid but lack the required scope or role
    PermissionDenied,
    /// Input rejected before any work was done
    Validation,
    /// A connected workspace (Google, Notion, ...) is disconnected or stale
    WorkspaceConnection,
    /// Local persistence failed
    Database,
    /// The operation did not finish in time
    Timeout,
    /// Nothing more specific applies
    Unknown,
}

impl ErrorType {
    /// Every variant, in declaration order.
    pub const ALL: [ErrorType; 10] = [
        ErrorType::ToolExecution,
        ErrorType::ApiFailure,
        ErrorType::NetworkError,
        ErrorType::RateLimit,
        ErrorType::PermissionDenied,
        ErrorType::Validation,
        ErrorType::WorkspaceConnection,
        ErrorType::Database,
        ErrorType::Timeout,
        ErrorType::Unknown,
    ];

    /// Stable wire name (`API_FAILURE`, `RATE_LIMIT`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolExecution => "TOOL_EXECUTION",
            Self::ApiFailure => "API_FAILURE",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Validation => "VALIDATION",
            Self::WorkspaceConnection => "WORKSPACE_CONNECTION",
            Self::Database => "DATABASE",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Best-effort typing of a plain error message.
    ///
    /// Used only at the boundary where an untyped failure is wrapped into an
    /// [`ErrorRecord`](crate::ErrorRecord).
    pub fn infer_from_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429")
        {
            Self::RateLimit
        } else if lower.contains("permission")
            || lower.contains("forbidden")
            || lower.contains("unauthorized")
            || lower.contains("access denied")
            || lower.contains("403")
        {
            Self::PermissionDenied
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("econnreset")
            || lower.contains("econnrefused")
            || lower.contains("network")
            || lower.contains("connection reset")
            || lower.contains("dns")
        {
            Self::NetworkError
        } else if lower.contains("invalid") || lower.contains("validation") || lower.contains("required")
        {
            Self::Validation
        } else if lower.contains("workspace") {
            Self::WorkspaceConnection
        } else if lower.contains("database") || lower.contains("sql") {
            Self::Database
        } else if lower.contains("api") || lower.contains("502") || lower.contains("503") {
            Self::ApiFailure
        } else if lower.contains("tool") {
            Self::ToolExecution
        } else {
            Self::Unknown
        }
    }

    /// Severity a record of this type starts with before classification.
    pub fn default_severity(&self) -> ErrorSeverity {
        match self {
            Self::PermissionDenied | Self::WorkspaceConnection | Self::Database => {
                ErrorSeverity::High
            }
            Self::Validation => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// User impact a record of this type starts with before classification.
    pub fn default_user_impact(&self) -> UserImpact {
        match self {
            Self::PermissionDenied | Self::WorkspaceConnection => UserImpact::High,
            Self::Validation | Self::RateLimit => UserImpact::Low,
            _ => UserImpact::Medium,
        }
    }

    /// Whether records of this type are retryable unless a pattern says otherwise.
    pub fn default_retryable(&self) -> bool {
        !matches!(self, Self::PermissionDenied)
    }

    /// Retry budget a record of this type starts with.
    pub fn default_max_retries(&self) -> u32 {
        match self {
            Self::PermissionDenied => 0,
            Self::Validation => 1,
            Self::RateLimit => 5,
            _ => 3,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
    /// Reserved for failures reported as emergencies; escalation never produces it.
    Emergency,
}

impl ErrorSeverity {
    /// One step up, saturating at `Critical`. `Emergency` is left untouched.
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
            Self::Emergency => Self::Emergency,
        }
    }

    /// CRITICAL and EMERGENCY failures are never retried automatically.
    pub fn requires_escalation(&self) -> bool {
        matches!(self, Self::Critical | Self::Emergency)
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
            Self::Emergency => "EMERGENCY",
        };
        f.write_str(s)
    }
}

/// How much the end user notices the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserImpact {
    None,
    Low,
    Medium,
    High,
}

impl UserImpact {
    /// One step down, saturating at `None`.
    pub fn step_down(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low | Self::None => Self::None,
        }
    }
}

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStrategy {
    /// Retry with no delay
    Immediate,
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * multiplier^(attempt - 1)`
    #[default]
    Exponential,
    /// Never retry
    None,
}
