//! # agent-recovery
//!
//! Error classification and recovery core for agent runtimes.
//!
//! ## Key Features
//!
//! - **Classification**: ordered, regex-based pattern registry turning raw failures into
//!   severity, retry budget, user message and suggested actions
//! - **Recovery**: per-error-type retry policies with linear/exponential backoff,
//!   circuit breakers and caller-supplied fallback or degradation paths
//! - **Agent integration**: operation tracking, retry decisions, user notifications and
//!   per-agent throttling
//! - **Cancellation**: in-flight recovery stops on a `CancellationToken` or deadline
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_recovery::{
//!     AgentErrorConfigOverrides, AgentErrorIntegration, ErrorType, OperationContext,
//!     RecoveryContext, RecoveryCoreConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let integration = AgentErrorIntegration::from_config(&RecoveryCoreConfig::default())?;
//! integration.initialize_agent_error_handling("agent-1", AgentErrorConfigOverrides::default());
//!
//! let value = integration
//!     .recovery()
//!     .execute_with_recovery(
//!         || async { Ok::<_, anyhow::Error>(42) },
//!         ErrorType::ApiFailure,
//!         &RecoveryContext::new("fetch_contacts").for_agent("agent-1"),
//!     )
//!     .await?;
//!
//! let context = OperationContext::new("agent-1", "sync_calendar");
//! let id = integration.track_operation_start(context.clone());
//! let outcome = integration
//!     .track_operation_failure(id, anyhow::anyhow!("connection reset by peer"), &context)
//!     .await;
//! if outcome.retry_scheduled {
//!     // schedule the retry after outcome.retry_in
//! }
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::missing_errors_doc)]

// Taxonomy and canonical error record
pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

pub mod classifier;
pub mod config;
pub mod error;
pub mod integration;
pub mod recovery;
pub mod sinks;

#[cfg(test)]
pub mod tests;

pub use classifier::{
    ClassificationResult, ContextAnalysis, ErrorClassifier, ErrorPattern, MetadataPredicate,
    StaticTelemetry, TelemetryProvider,
};
pub use config::{
    AgentErrorConfig, AgentErrorConfigOverrides, RecoveryCoreConfig, RecoveryStrategyConfig,
};
pub use core_types::{
    AgentFailure, ErrorContext, ErrorRecord, ErrorSeverity, ErrorType, RetryStrategy, UserImpact,
};
pub use error::{CancelReason, RecoveryError, RecoveryErrorCategory, RecoveryResult};
pub use integration::{
    AgentErrorIntegration, AgentErrorOutcome, AgentErrorStats, AgentOperation, OperationContext,
};
pub use recovery::{
    AlternativeKind, CircuitBreakerState, CircuitState, FnAlternative, RecoveryAlternative,
    RecoveryContext, RecoveryStrategyManager,
};
pub use sinks::{
    ErrorLogSink, ErrorNotification, EscalationNotification, EscalationReason, NotificationSink,
    ResolutionNotification, RetryNotification, TracingErrorSink, TracingNotificationSink,
};

// Cancellation handle accepted by RecoveryContext
pub use tokio_util::sync::CancellationToken;
