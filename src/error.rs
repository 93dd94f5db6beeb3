//! Error types for recovery operations.
//!
//! [`RecoveryError`] is what the recovery core itself returns: terminal
//! operation failures after every avenue was tried, short-circuits from an
//! open circuit breaker, cancellation, and configuration problems.
//!
//! Failures of the *operations* being protected are not modelled here; they
//! are canonicalised into [`ErrorRecord`](crate::ErrorRecord)s.
//!
//! # Example
//!
//! ```rust,no_run
//! use agent_recovery::{RecoveryError, error::RecoveryErrorCategory};
//!
//! fn report(err: &RecoveryError) {
//!     match err.category() {
//!         RecoveryErrorCategory::Cancelled => println!("stopped by caller"),
//!         RecoveryErrorCategory::Transient => println!("try again later: {}", err.user_message()),
//!         _ => println!("giving up: {err}"),
//!     }
//! }
//! ```

use crate::core_types::ErrorType;
use crate::logging::{log_error, log_warn};
use std::fmt;
use thiserror::Error;

/// High-level categorization of recovery errors for routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryErrorCategory {
    /// Temporary condition, a later call may succeed (open breaker).
    Transient,
    /// The protected operation kept failing.
    External,
    /// The caller stopped the work or its deadline passed.
    Cancelled,
    /// The caller supplied bad configuration or patterns.
    Client,
    /// Bug or poisoned state inside the core.
    Internal,
}

/// Why an in-flight recovery loop was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The cancellation token was triggered.
    Aborted,
    /// The overall deadline in the recovery context elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => f.write_str("aborted by caller"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Convenient result type for recovery operations.
pub type RecoveryResult<T> = std::result::Result<T, RecoveryError>;

/// Errors returned by the recovery core.
///
/// | Variant | Category | Retryable |
/// |---------|----------|-----------|
/// | `CircuitOpen` | Transient | Yes |
/// | `Cancelled` | Cancelled | No |
/// | `OperationFailed` | External | No |
/// | `InvalidPattern` | Client | No |
/// | `Configuration` | Client | No |
/// | `Internal` | Internal | No |
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// The circuit breaker for this error type is open; the operation was not run.
    #[error("Circuit breaker open for {error_type}, next attempt in {retry_after_ms}ms")]
    CircuitOpen {
        error_type: ErrorType,
        /// Milliseconds until the breaker admits a probe.
        retry_after_ms: u64,
    },

    /// Retrying stopped because the caller cancelled or the deadline passed.
    #[error("Recovery for {error_type} cancelled after {attempts} attempt(s): {reason}")]
    Cancelled {
        error_type: ErrorType,
        attempts: u32,
        reason: CancelReason,
    },

    /// Retries, fallback and degradation were all exhausted.
    ///
    /// `source` is the last error the operation returned.
    #[error("Operation failed for {error_type} after {attempts} attempt(s): {source}")]
    OperationFailed {
        error_type: ErrorType,
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A pattern could not be registered.
    #[error("Invalid error pattern: {message}")]
    InvalidPattern { message: String },

    /// Configuration values are inconsistent or out of range.
    #[error("Recovery configuration error: {message}")]
    Configuration { message: String },

    /// Internal state could not be read or updated.
    #[error("Internal recovery error: {message}")]
    Internal { message: String },
}

impl RecoveryError {
    pub fn category(&self) -> RecoveryErrorCategory {
        match self {
            Self::CircuitOpen { .. } => RecoveryErrorCategory::Transient,
            Self::Cancelled { .. } => RecoveryErrorCategory::Cancelled,
            Self::OperationFailed { .. } => RecoveryErrorCategory::External,
            Self::InvalidPattern { .. } | Self::Configuration { .. } => {
                RecoveryErrorCategory::Client
            }
            Self::Internal { .. } => RecoveryErrorCategory::Internal,
        }
    }

    /// Only an open breaker is worth retrying later; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Whether this is the cancellation kind rather than an operation failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Message safe to show to end users.
    pub fn user_message(&self) -> String {
        match self {
            Self::CircuitOpen { retry_after_ms, .. } => {
                let secs = retry_after_ms.div_ceil(1000);
                format!("This service is temporarily paused after repeated failures. Please try again in {secs} seconds")
            }
            Self::Cancelled { .. } => "The operation was cancelled".to_string(),
            Self::OperationFailed { .. } => {
                "The operation could not be completed after several attempts".to_string()
            }
            Self::InvalidPattern { .. } | Self::Configuration { .. } => {
                "Error handling is misconfigured. Please contact your administrator".to_string()
            }
            Self::Internal { .. } => "An unexpected error occurred".to_string(),
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    pub fn circuit_open(error_type: ErrorType, retry_after_ms: u64) -> Self {
        log_warn!(
            error_type = %error_type,
            retry_after_ms = retry_after_ms,
            "Operation short-circuited by open circuit breaker"
        );
        Self::CircuitOpen {
            error_type,
            retry_after_ms,
        }
    }

    pub fn cancelled(error_type: ErrorType, attempts: u32, reason: CancelReason) -> Self {
        log_warn!(
            error_type = %error_type,
            attempts = attempts,
            reason = %reason,
            "Recovery cancelled"
        );
        Self::Cancelled {
            error_type,
            attempts,
            reason,
        }
    }

    pub fn operation_failed(
        error_type: ErrorType,
        attempts: u32,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let source = source.into();
        log_error!(
            error_type = %error_type,
            attempts = attempts,
            error = %source,
            "Operation failed after all recovery attempts"
        );
        Self::OperationFailed {
            error_type,
            attempts,
            source,
        }
    }

    pub fn invalid_pattern(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(message = %message, "Rejected error pattern");
        Self::InvalidPattern { message }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Recovery configuration validation failed"
        );
        Self::Configuration { message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(message = %message, "Internal recovery error");
        Self::Internal { message }
    }
}
