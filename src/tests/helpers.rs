//! Test helper utilities for unit tests
//!
//! Recording fakes for the sink traits and fixed timestamps, shared across
//! test modules.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

#![allow(dead_code)]

use crate::classifier::{ErrorClassifier, StaticTelemetry};
use crate::core_types::ErrorRecord;
use crate::integration::AgentErrorIntegration;
use crate::recovery::RecoveryStrategyManager;
use crate::sinks::{
    ErrorLogSink, ErrorNotification, EscalationNotification, NotificationSink,
    ResolutionNotification, RetryNotification,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// Wednesday 2024-05-15 10:30 UTC
pub fn business_hours() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 10, 30, 0).unwrap()
}

/// Wednesday 2024-05-15 22:00 UTC
pub fn off_hours() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 22, 0, 0).unwrap()
}

/// Saturday 2024-05-18 11:00 UTC
pub fn weekend() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 18, 11, 0, 0).unwrap()
}

/// Error sink that keeps every record and hands out sequential ids
#[derive(Default)]
pub struct RecordingErrorSink {
    pub records: Mutex<Vec<ErrorRecord>>,
}

impl RecordingErrorSink {
    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl ErrorLogSink for RecordingErrorSink {
    async fn log_error(&self, record: &ErrorRecord) -> anyhow::Result<String> {
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(format!("err-{}", records.len()))
    }
}

/// Error sink that always fails
pub struct FailingErrorSink;

#[async_trait]
impl ErrorLogSink for FailingErrorSink {
    async fn log_error(&self, _record: &ErrorRecord) -> anyhow::Result<String> {
        anyhow::bail!("error store unavailable")
    }
}

/// Notification sink that keeps every notification by kind
#[derive(Default)]
pub struct RecordingNotifier {
    pub errors: Mutex<Vec<ErrorNotification>>,
    pub retries: Mutex<Vec<RetryNotification>>,
    pub escalations: Mutex<Vec<EscalationNotification>>,
    pub resolutions: Mutex<Vec<ResolutionNotification>>,
}

impl RecordingNotifier {
    pub fn errors(&self) -> Vec<ErrorNotification> {
        self.errors.lock().unwrap().clone()
    }

    pub fn retries(&self) -> Vec<RetryNotification> {
        self.retries.lock().unwrap().clone()
    }

    pub fn escalations(&self) -> Vec<EscalationNotification> {
        self.escalations.lock().unwrap().clone()
    }

    pub fn resolutions(&self) -> Vec<ResolutionNotification> {
        self.resolutions.lock().unwrap().clone()
    }

    pub fn total(&self) -> usize {
        self.errors().len()
            + self.retries().len()
            + self.escalations().len()
            + self.resolutions().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send_error_notification(
        &self,
        notification: &ErrorNotification,
    ) -> anyhow::Result<()> {
        self.errors.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn send_retry_notification(
        &self,
        notification: &RetryNotification,
    ) -> anyhow::Result<()> {
        self.retries.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn send_escalation_notification(
        &self,
        notification: &EscalationNotification,
    ) -> anyhow::Result<()> {
        self.escalations.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn send_resolution_notification(
        &self,
        notification: &ResolutionNotification,
    ) -> anyhow::Result<()> {
        self.resolutions.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Integration wired to recording fakes, built-in patterns and policies
pub struct Harness {
    pub integration: AgentErrorIntegration,
    pub errors: Arc<RecordingErrorSink>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn create_harness() -> Harness {
    create_harness_with_classifier(ErrorClassifier::with_default_patterns(Arc::new(
        StaticTelemetry::default(),
    )))
}

pub fn create_harness_with_classifier(classifier: ErrorClassifier) -> Harness {
    let errors = Arc::new(RecordingErrorSink::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let integration = AgentErrorIntegration::new(
        Arc::new(classifier),
        Arc::new(RecoveryStrategyManager::with_default_strategies()),
        errors.clone(),
        notifier.clone(),
    );
    Harness {
        integration,
        errors,
        notifier,
    }
}
