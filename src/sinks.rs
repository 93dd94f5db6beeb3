//! Side-effect collaborators: error persistence and user notifications.
//!
//! Storage, templates and delivery channels belong to the implementations.
//! The tracing-backed defaults make the core usable with no wiring at all.

use crate::core_types::{ErrorRecord, ErrorSeverity, ErrorType};
use crate::logging::{log_error, log_info, log_warn};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Durable storage for error records
#[async_trait]
pub trait ErrorLogSink: Send + Sync {
    /// Persist `record` and return the id it is stored under.
    async fn log_error(&self, record: &ErrorRecord) -> anyhow::Result<String>;
}

/// A failure the user should hear about
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorNotification {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub error_id: Option<String>,
    pub error_type: ErrorType,
    pub severity: ErrorSeverity,
    pub user_message: String,
    pub suggested_actions: Vec<String>,
    pub estimated_resolution_minutes: u32,
}

/// Progress notice for a scheduled retry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryNotification {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub error_id: Option<String>,
    pub error_type: ErrorType,
    /// 1-based number of the retry about to happen
    pub current_attempt: u32,
    pub total_attempts: u32,
    pub retry_in: Duration,
    pub user_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The agent crossed its error threshold and was throttled
    AgentThrottled,
    /// The failure was classified CRITICAL or EMERGENCY
    SeverityCritical,
}

/// High-priority notice routed to a human
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationNotification {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub error_id: Option<String>,
    pub reason: EscalationReason,
    pub severity: ErrorSeverity,
    /// Errors handled for the agent so far
    pub error_count: u32,
    pub message: String,
}

/// An operation that had failed before has now succeeded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionNotification {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub operation_id: Uuid,
    pub operation: String,
    /// Retries it took before the success
    pub retries: u32,
}

/// User-facing notification delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_error_notification(&self, notification: &ErrorNotification)
        -> anyhow::Result<()>;

    async fn send_retry_notification(&self, notification: &RetryNotification)
        -> anyhow::Result<()>;

    async fn send_escalation_notification(
        &self,
        notification: &EscalationNotification,
    ) -> anyhow::Result<()>;

    async fn send_resolution_notification(
        &self,
        notification: &ResolutionNotification,
    ) -> anyhow::Result<()>;
}

/// Writes error records to the tracing pipeline and uses the record id as the error id
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

#[async_trait]
impl ErrorLogSink for TracingErrorSink {
    async fn log_error(&self, record: &ErrorRecord) -> anyhow::Result<String> {
        log_error!(
            error_id = %record.id,
            error_type = %record.error_type,
            severity = %record.severity,
            agent_id = ?record.context.agent_id,
            operation = ?record.context.operation,
            retry_attempt = record.retry_attempt,
            message = %record.message,
            "Agent error recorded"
        );
        Ok(record.id.to_string())
    }
}

/// Emits every notification as a structured tracing event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn send_error_notification(
        &self,
        notification: &ErrorNotification,
    ) -> anyhow::Result<()> {
        log_info!(
            agent_id = %notification.agent_id,
            error_id = ?notification.error_id,
            error_type = %notification.error_type,
            suggestions = notification.suggested_actions.len(),
            user_message = %notification.user_message,
            "Error notification"
        );
        Ok(())
    }

    async fn send_retry_notification(
        &self,
        notification: &RetryNotification,
    ) -> anyhow::Result<()> {
        log_info!(
            agent_id = %notification.agent_id,
            error_id = ?notification.error_id,
            attempt = notification.current_attempt,
            total_attempts = notification.total_attempts,
            retry_in_ms = notification.retry_in.as_millis(),
            "Retry notification"
        );
        Ok(())
    }

    async fn send_escalation_notification(
        &self,
        notification: &EscalationNotification,
    ) -> anyhow::Result<()> {
        log_warn!(
            agent_id = %notification.agent_id,
            error_id = ?notification.error_id,
            reason = ?notification.reason,
            severity = %notification.severity,
            error_count = notification.error_count,
            "Escalation notification"
        );
        Ok(())
    }

    async fn send_resolution_notification(
        &self,
        notification: &ResolutionNotification,
    ) -> anyhow::Result<()> {
        log_info!(
            agent_id = %notification.agent_id,
            operation_id = %notification.operation_id,
            operation = %notification.operation,
            retries = notification.retries,
            "Resolution notification"
        );
        Ok(())
    }
}
