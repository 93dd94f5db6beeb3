//! Per-agent orchestration of classification, retry decisions and throttling.
//!
//! [`AgentErrorIntegration`] ties one [`ErrorClassifier`] and one
//! [`RecoveryStrategyManager`] to the agents registered with it. It tracks
//! in-flight operations, turns reported failures into an
//! [`AgentErrorOutcome`] and throttles agents that keep failing. The agent
//! throttle is independent of the per-error-type circuit breakers.

pub mod operations;
pub(crate) mod throttle;

use crate::classifier::{ClassificationResult, ErrorClassifier};
use crate::config::{
    AgentErrorConfig, AgentErrorConfigOverrides, RecoveryCoreConfig, RecoveryStrategyConfig,
    DEFAULT_THROTTLE_COOLDOWN,
};
use crate::core_types::{AgentFailure, ErrorRecord, UserImpact};
use crate::error::{RecoveryError, RecoveryResult};
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::recovery::RecoveryStrategyManager;
use crate::sinks::{
    ErrorLogSink, ErrorNotification, EscalationNotification, EscalationReason, NotificationSink,
    ResolutionNotification, RetryNotification, TracingErrorSink, TracingNotificationSink,
};
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub use operations::{AgentOperation, OperationContext};

use operations::OperationTracker;
use throttle::{AgentRegistry, ErrorTally};

const UNREGISTERED_AGENT_MESSAGE: &str =
    "An error occurred. Error handling is not configured for this agent.";
const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Structured answer to a reported failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentErrorOutcome {
    /// Always `false`; present so the outcome reads the same as other operation results
    pub success: bool,
    /// Id assigned by the error log sink, if it accepted the record
    pub error_id: Option<String>,
    pub user_message: String,
    pub retry_scheduled: bool,
    pub retry_in: Option<Duration>,
    pub classification: Option<ClassificationResult>,
    /// The agent is throttled after this error
    pub throttled: bool,
}

impl AgentErrorOutcome {
    fn minimal(user_message: &str) -> Self {
        Self {
            success: false,
            error_id: None,
            user_message: user_message.to_string(),
            retry_scheduled: false,
            retry_in: None,
            classification: None,
            throttled: false,
        }
    }
}

/// Error bookkeeping for one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentErrorStats {
    pub agent_id: String,
    pub config: AgentErrorConfig,
    /// Errors handled since registration, the last reset or the last throttle clear
    pub error_count: u32,
    pub throttled: bool,
    pub throttle_remaining: Option<Duration>,
    pub active_operations: usize,
}

/// Per-agent error handling on top of a shared classifier and recovery manager
pub struct AgentErrorIntegration {
    classifier: Arc<ErrorClassifier>,
    recovery: Arc<RecoveryStrategyManager>,
    error_sink: Arc<dyn ErrorLogSink>,
    notifier: Arc<dyn NotificationSink>,
    agent_defaults: AgentErrorConfig,
    throttle_cooldown: Duration,
    agents: AgentRegistry,
    operations: OperationTracker,
}

impl std::fmt::Debug for AgentErrorIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentErrorIntegration")
            .field("classifier", &self.classifier)
            .field("recovery", &self.recovery)
            .field("agent_defaults", &self.agent_defaults)
            .field("throttle_cooldown", &self.throttle_cooldown)
            .finish_non_exhaustive()
    }
}

impl AgentErrorIntegration {
    pub fn new(
        classifier: Arc<ErrorClassifier>,
        recovery: Arc<RecoveryStrategyManager>,
        error_sink: Arc<dyn ErrorLogSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            classifier,
            recovery,
            error_sink,
            notifier,
            agent_defaults: AgentErrorConfig::default(),
            throttle_cooldown: DEFAULT_THROTTLE_COOLDOWN,
            agents: AgentRegistry::default(),
            operations: OperationTracker::default(),
        }
    }

    /// Fully wired instance: built-in patterns, policies from `config`,
    /// tracing-backed sinks.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if `config` is invalid.
    pub fn from_config(config: &RecoveryCoreConfig) -> RecoveryResult<Self> {
        let recovery = RecoveryStrategyManager::from_config(config)?;
        Ok(Self::new(
            Arc::new(ErrorClassifier::default()),
            Arc::new(recovery),
            Arc::new(TracingErrorSink),
            Arc::new(TracingNotificationSink),
        )
        .with_agent_defaults(config.agent_defaults.clone())
        .with_throttle_cooldown(config.throttle_cooldown))
    }

    /// Defaults every registration's overrides are merged onto
    pub fn with_agent_defaults(mut self, defaults: AgentErrorConfig) -> Self {
        self.agent_defaults = defaults;
        self
    }

    pub fn with_throttle_cooldown(mut self, cooldown: Duration) -> Self {
        self.throttle_cooldown = cooldown;
        self
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    pub fn recovery(&self) -> &Arc<RecoveryStrategyManager> {
        &self.recovery
    }

    /// Register `agent_id` (or update its config) and return the effective config.
    ///
    /// Calling it again with the same overrides changes nothing. A zero
    /// escalation threshold is rejected in favour of the default one.
    pub fn initialize_agent_error_handling(
        &self,
        agent_id: &str,
        overrides: AgentErrorConfigOverrides,
    ) -> AgentErrorConfig {
        let mut config = self.agent_defaults.merged(&overrides);
        if config.escalate_after_failures == 0 {
            let fallback = self.agent_defaults.escalate_after_failures.max(1);
            log_warn!(
                agent_id = %agent_id,
                escalate_after_failures = fallback,
                "Ignoring escalate_after_failures override of 0"
            );
            config.escalate_after_failures = fallback;
        }
        let created = self.agents.register(agent_id, config.clone());
        log_info!(
            agent_id = %agent_id,
            created = created,
            enable_error_recovery = config.enable_error_recovery,
            enable_user_notifications = config.enable_user_notifications,
            escalate_after_failures = config.escalate_after_failures,
            "Agent error handling initialized"
        );
        config
    }

    pub fn track_operation_start(&self, context: OperationContext) -> Uuid {
        let agent_id = context.agent_id.clone();
        let operation = context.operation.clone();
        let id = self.operations.start(context);
        log_debug!(
            agent_id = %agent_id,
            operation = %operation,
            operation_id = %id,
            "Operation started"
        );
        id
    }

    /// Finish a tracked operation successfully.
    ///
    /// Returns `false` (and changes nothing) if the id is unknown or already
    /// finished. An operation that succeeded on a retry sends a resolution notice.
    pub async fn track_operation_success(&self, operation_id: Uuid) -> bool {
        let Some(operation) = self.operations.finish(operation_id) else {
            log_warn!(
                operation_id = %operation_id,
                "Operation success reported for unknown or already finished operation"
            );
            return false;
        };

        log_debug!(
            agent_id = %operation.agent_id,
            operation = %operation.operation,
            operation_id = %operation_id,
            "Operation succeeded"
        );

        let retries = operation.context.retry_attempt;
        let notify = self
            .agents
            .with_agent(&operation.agent_id, |s| s.config.enable_user_notifications)
            .unwrap_or(false);

        if retries > 0 && notify {
            let notification = ResolutionNotification {
                agent_id: operation.agent_id.clone(),
                user_id: operation.context.user_id.clone(),
                operation_id,
                operation: operation.operation.clone(),
                retries,
            };
            if let Err(e) = self.notifier.send_resolution_notification(&notification).await {
                log_warn!(agent_id = %operation.agent_id, error = %e, "Failed to send resolution notification");
            }
        }
        true
    }

    /// Finish a tracked operation with a failure and handle the error.
    ///
    /// The error is handled even when the id is unknown.
    pub async fn track_operation_failure(
        &self,
        operation_id: Uuid,
        failure: impl Into<AgentFailure>,
        context: &OperationContext,
    ) -> AgentErrorOutcome {
        if self.operations.finish(operation_id).is_none() {
            log_debug!(
                operation_id = %operation_id,
                agent_id = %context.agent_id,
                "Failure reported for untracked operation"
            );
        }
        self.handle_agent_error(failure, context).await
    }

    /// Classify a failure and decide what happens next. Never fails.
    pub async fn handle_agent_error(
        &self,
        failure: impl Into<AgentFailure>,
        context: &OperationContext,
    ) -> AgentErrorOutcome {
        let failure = failure.into();
        let handled = AssertUnwindSafe(self.try_handle_agent_error(failure, context))
            .catch_unwind()
            .await;

        match handled {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                log_error!(agent_id = %context.agent_id, error = %e, "Agent error handling failed");
                AgentErrorOutcome::minimal(UNEXPECTED_ERROR_MESSAGE)
            }
            Err(_) => {
                log_error!(agent_id = %context.agent_id, "Agent error handling panicked");
                AgentErrorOutcome::minimal(UNEXPECTED_ERROR_MESSAGE)
            }
        }
    }

    async fn try_handle_agent_error(
        &self,
        failure: AgentFailure,
        context: &OperationContext,
    ) -> RecoveryResult<AgentErrorOutcome> {
        let agent_id = context.agent_id.as_str();
        let Some(config) = self.agents.with_agent(agent_id, |s| s.config.clone()) else {
            log_warn!(agent_id = %agent_id, "Error reported for unregistered agent");
            return Ok(AgentErrorOutcome::minimal(UNREGISTERED_AGENT_MESSAGE));
        };

        let failure = failure.normalize();
        let wrapped = matches!(failure, AgentFailure::Raw(_));
        let mut record =
            failure.into_record(context.error_type, context.error_context(), context.retry_attempt);
        if wrapped {
            record.metadata.extend(context.metadata.clone());
        }

        let error_id = match self.error_sink.log_error(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                log_warn!(agent_id = %agent_id, error_id = %record.id, error = %e, "Error log sink rejected record");
                None
            }
        };

        let classification = self.classifier.classify(&record);

        let now = Instant::now();
        let cooldown = self.throttle_cooldown;
        let tally = self
            .agents
            .with_agent(agent_id, |s| s.record_error(now, cooldown))
            .ok_or_else(|| {
                RecoveryError::internal(format!("agent {agent_id} was removed while handling an error"))
            })?;

        let retry_scheduled = config.enable_error_recovery
            && classification.retryable
            && record.retry_attempt < classification.max_retries
            && !classification.severity.requires_escalation()
            && !self.recovery.is_circuit_open(record.error_type);

        let retry_in = retry_scheduled.then(|| {
            let policy = RecoveryStrategyConfig {
                strategy: classification.retry_strategy,
                ..self.recovery.get_strategy_config(record.error_type)
            };
            self.recovery
                .calculate_delay(record.retry_attempt.saturating_add(1), &policy)
        });

        log_debug!(
            agent_id = %agent_id,
            error_type = %record.error_type,
            severity = %classification.severity,
            retry_attempt = record.retry_attempt,
            retry_scheduled = retry_scheduled,
            retry_in_ms = ?retry_in.map(|d| d.as_millis()),
            error_count = tally.error_count,
            "Agent error handled"
        );

        if config.enable_user_notifications && classification.user_impact != UserImpact::None {
            self.notify_user(context, &record, &classification, error_id.as_deref(), retry_in)
                .await;
        }

        if classification.severity.requires_escalation() {
            self.escalate(
                context,
                &record,
                error_id.as_deref(),
                EscalationReason::SeverityCritical,
                &classification,
                tally,
            )
            .await;
        }
        if tally.newly_throttled {
            self.escalate(
                context,
                &record,
                error_id.as_deref(),
                EscalationReason::AgentThrottled,
                &classification,
                tally,
            )
            .await;
        }

        Ok(AgentErrorOutcome {
            success: false,
            error_id,
            user_message: classification.user_message.clone(),
            retry_scheduled,
            retry_in,
            classification: Some(classification),
            throttled: tally.throttled,
        })
    }

    /// Initial error notice on the first failure, a progress notice per
    /// scheduled retry and a terminal notice once no retry follows.
    async fn notify_user(
        &self,
        context: &OperationContext,
        record: &ErrorRecord,
        classification: &ClassificationResult,
        error_id: Option<&str>,
        retry_in: Option<Duration>,
    ) {
        let agent_id = context.agent_id.clone();

        if record.retry_attempt == 0 || retry_in.is_none() {
            let notification = ErrorNotification {
                agent_id: agent_id.clone(),
                user_id: context.user_id.clone(),
                error_id: error_id.map(str::to_string),
                error_type: record.error_type,
                severity: classification.severity,
                user_message: classification.user_message.clone(),
                suggested_actions: classification.suggested_actions.clone(),
                estimated_resolution_minutes: classification.estimated_resolution_minutes,
            };
            if let Err(e) = self.notifier.send_error_notification(&notification).await {
                log_warn!(agent_id = %agent_id, error = %e, "Failed to send error notification");
            }
        }

        if let Some(retry_in) = retry_in {
            let notification = RetryNotification {
                agent_id: agent_id.clone(),
                user_id: context.user_id.clone(),
                error_id: error_id.map(str::to_string),
                error_type: record.error_type,
                current_attempt: record.retry_attempt.saturating_add(1),
                total_attempts: classification.max_retries,
                retry_in,
                user_message: classification.user_message.clone(),
            };
            if let Err(e) = self.notifier.send_retry_notification(&notification).await {
                log_warn!(agent_id = %agent_id, error = %e, "Failed to send retry notification");
            }
        }
    }

    async fn escalate(
        &self,
        context: &OperationContext,
        record: &ErrorRecord,
        error_id: Option<&str>,
        reason: EscalationReason,
        classification: &ClassificationResult,
        tally: ErrorTally,
    ) {
        let agent_id = context.agent_id.clone();
        let message = match reason {
            EscalationReason::AgentThrottled => format!(
                "Agent {agent_id} throttled after {} errors; last error: {}",
                tally.error_count, record.message
            ),
            EscalationReason::SeverityCritical => format!(
                "{} error for agent {agent_id}: {}",
                classification.severity, record.message
            ),
        };
        let notification = EscalationNotification {
            agent_id: agent_id.clone(),
            user_id: context.user_id.clone(),
            error_id: error_id.map(str::to_string),
            reason,
            severity: classification.severity,
            error_count: tally.error_count,
            message,
        };
        if let Err(e) = self.notifier.send_escalation_notification(&notification).await {
            log_warn!(agent_id = %agent_id, error = %e, "Failed to send escalation notification");
        }
    }

    /// Whether `agent_id` is inside its cool-down. An expired throttle is
    /// cleared by this check.
    pub fn should_throttle_agent(&self, agent_id: &str) -> bool {
        let now = Instant::now();
        self.agents
            .with_agent(agent_id, |s| s.refresh(now))
            .unwrap_or(false)
    }

    pub fn agent_error_stats(&self, agent_id: &str) -> Option<AgentErrorStats> {
        let now = Instant::now();
        let active_operations = self.operations.count_for(agent_id);
        self.agents.with_agent(agent_id, |s| {
            let throttled = s.refresh(now);
            AgentErrorStats {
                agent_id: agent_id.to_string(),
                config: s.config.clone(),
                error_count: s.error_count,
                throttled,
                throttle_remaining: if throttled { s.remaining(now) } else { None },
                active_operations,
            }
        })
    }

    /// Clear the error count and any throttle. Returns `false` for unknown agents.
    pub fn reset_agent_errors(&self, agent_id: &str) -> bool {
        let reset = self.agents.with_agent(agent_id, |s| s.reset()).is_some();
        if reset {
            log_info!(agent_id = %agent_id, "Agent error state reset");
        }
        reset
    }

    /// Unregister `agent_id` and drop its in-flight operations.
    pub fn remove_agent(&self, agent_id: &str) -> bool {
        let removed = self.agents.remove(agent_id);
        let dropped = self.operations.drop_agent(agent_id);
        if removed {
            log_info!(agent_id = %agent_id, dropped_operations = dropped, "Agent removed");
        }
        removed
    }

    /// In-flight operations, oldest first
    pub fn active_operations(&self) -> Vec<AgentOperation> {
        self.operations.snapshot()
    }
}
