//! Test helper utilities for agent-recovery integration tests
//!
//! Recording sinks and wiring built only on the public API.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use agent_recovery::{
    AgentErrorConfigOverrides, AgentErrorIntegration, ErrorClassifier, ErrorLogSink,
    ErrorNotification, ErrorRecord, EscalationNotification, NotificationSink,
    RecoveryStrategyManager, ResolutionNotification, RetryNotification,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Error sink that counts records and hands out sequential ids
#[derive(Default)]
pub struct CountingErrorSink {
    count: AtomicUsize,
}

impl CountingErrorSink {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ErrorLogSink for CountingErrorSink {
    async fn log_error(&self, _record: &ErrorRecord) -> anyhow::Result<String> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("err-{n}"))
    }
}

/// Notification sink that keeps escalations and counts everything else
#[derive(Default)]
pub struct RecordingNotifier {
    pub escalations: Mutex<Vec<EscalationNotification>>,
    pub retries: Mutex<Vec<RetryNotification>>,
    pub errors: AtomicUsize,
    pub resolutions: AtomicUsize,
}

impl RecordingNotifier {
    pub fn escalations(&self) -> Vec<EscalationNotification> {
        self.escalations.lock().unwrap().clone()
    }

    pub fn retries(&self) -> Vec<RetryNotification> {
        self.retries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send_error_notification(&self, _notification: &ErrorNotification) -> anyhow::Result<()> {
        self.errors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_retry_notification(&self, notification: &RetryNotification) -> anyhow::Result<()> {
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
        _notification: &ResolutionNotification,
    ) -> anyhow::Result<()> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct TestSystem {
    pub integration: Arc<AgentErrorIntegration>,
    pub errors: Arc<CountingErrorSink>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Integration with built-in patterns and policies, wired to recording sinks
pub fn create_test_system() -> TestSystem {
    let errors = Arc::new(CountingErrorSink::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let integration = AgentErrorIntegration::new(
        Arc::new(ErrorClassifier::default()),
        Arc::new(RecoveryStrategyManager::with_default_strategies()),
        errors.clone(),
        notifier.clone(),
    );
    TestSystem {
        integration: Arc::new(integration),
        errors,
        notifier,
    }
}

pub fn escalate_after(failures: u32) -> AgentErrorConfigOverrides {
    AgentErrorConfigOverrides {
        escalate_after_failures: Some(failures),
        ..AgentErrorConfigOverrides::default()
    }
}
