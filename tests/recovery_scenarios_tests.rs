//! End-to-End Recovery Scenarios
//!
//! Exercises the public API the way an agent runtime would: a classifier,
//! a recovery manager and the agent integration wired together, with time
//! driven by tokio's paused clock.
//!
//! ## Test Organization
//!
//! - **Circuit breaking**: repeated failures stop calls to a failing dependency
//! - **Agent throttling**: a noisy agent is throttled, then released after cool-down
//! - **Validation retries**: a validation failure gets exactly one linear retry
//! - **Alternatives**: a fallback result replaces an exhausted retry loop

mod common;
use agent_recovery::{
    AgentErrorConfigOverrides, CircuitState, ErrorRecord, ErrorType, EscalationReason, FnAlternative,
    OperationContext, RecoveryAlternative, RecoveryContext, RecoveryError, RecoveryStrategyConfig,
    RecoveryStrategyManager, RetryStrategy,
};
use anyhow::anyhow;
use common::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Circuit breaking
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fifth_api_failure_opens_breaker_and_sixth_call_is_short_circuited() {
    // Arrange
    let manager = RecoveryStrategyManager::new();
    manager
        .register_strategy(
            ErrorType::ApiFailure,
            RecoveryStrategyConfig {
                max_retries: 1,
                circuit_breaker_threshold: 5,
                ..RecoveryStrategyConfig::default()
            },
        )
        .unwrap();
    let calls = AtomicU32::new(0);
    let context = RecoveryContext::new("fetch_invoices").for_agent("billing-agent");
    let op = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(anyhow!("502 Bad Gateway")) }
    };

    // Act
    for _ in 0..5 {
        let result = manager
            .execute_with_recovery(op, ErrorType::ApiFailure, &context)
            .await;
        assert!(matches!(result, Err(RecoveryError::OperationFailed { .. })));
    }
    let sixth = manager
        .execute_with_recovery(op, ErrorType::ApiFailure, &context)
        .await;

    // Assert
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(matches!(
        sixth,
        Err(RecoveryError::CircuitOpen {
            error_type: ErrorType::ApiFailure,
            ..
        })
    ));
    let state = manager.circuit_state(ErrorType::ApiFailure);
    assert_eq!(state.state, CircuitState::Open);
    assert!(!manager.is_circuit_open(ErrorType::NetworkError));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_admits_probe_after_open_period() {
    // Arrange
    let manager = RecoveryStrategyManager::with_default_strategies();
    for _ in 0..5 {
        manager.record_failure(ErrorType::Database);
    }
    assert!(manager.is_circuit_open(ErrorType::Database));

    // Act
    tokio::time::advance(Duration::from_secs(5 * 60)).await;
    let probe = manager
        .execute_with_recovery(
            || async { Ok::<_, anyhow::Error>("row") },
            ErrorType::Database,
            &RecoveryContext::new("load_profile"),
        )
        .await;

    // Assert
    assert_eq!(probe.unwrap(), "row");
    assert_eq!(
        manager.circuit_state(ErrorType::Database).state,
        CircuitState::Closed
    );
}

// ============================================================================
// Agent throttling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_agent_throttled_after_threshold_and_released_after_cooldown() {
    // Arrange
    let system = create_test_system();
    system
        .integration
        .initialize_agent_error_handling("calendar-agent", escalate_after(3));
    let context = OperationContext::new("calendar-agent", "create_event")
        .with_error_type(ErrorType::NetworkError);

    // Act
    for _ in 0..2 {
        let outcome = system
            .integration
            .handle_agent_error(anyhow!("connection refused"), &context)
            .await;
        assert!(!outcome.throttled);
    }
    let third = system
        .integration
        .handle_agent_error(anyhow!("connection refused"), &context)
        .await;

    // Assert
    assert!(third.throttled);
    assert!(system.integration.should_throttle_agent("calendar-agent"));
    let escalations = system.notifier.escalations();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].reason, EscalationReason::AgentThrottled);

    tokio::time::advance(Duration::from_secs(5 * 60) - Duration::from_millis(1)).await;
    assert!(system.integration.should_throttle_agent("calendar-agent"));

    tokio::time::advance(Duration::from_millis(2)).await;
    assert!(!system.integration.should_throttle_agent("calendar-agent"));
    assert_eq!(
        system
            .integration
            .agent_error_stats("calendar-agent")
            .unwrap()
            .error_count,
        0
    );
}

#[tokio::test]
async fn test_agent_throttle_does_not_touch_circuit_breakers() {
    // Arrange
    let system = create_test_system();
    system
        .integration
        .initialize_agent_error_handling("crm-agent", escalate_after(1));
    let context =
        OperationContext::new("crm-agent", "update_contact").with_error_type(ErrorType::ApiFailure);

    // Act
    let outcome = system
        .integration
        .handle_agent_error(anyhow!("500 internal server error"), &context)
        .await;

    // Assert
    assert!(outcome.throttled);
    assert!(outcome.retry_scheduled);
    assert!(!system.integration.recovery().is_circuit_open(ErrorType::ApiFailure));
}

// ============================================================================
// Validation retries
// ============================================================================

#[tokio::test]
async fn test_validation_failure_gets_one_linear_retry() {
    // Arrange
    let system = create_test_system();
    system
        .integration
        .initialize_agent_error_handling("forms-agent", AgentErrorConfigOverrides::default());
    let first_context = OperationContext::new("forms-agent", "submit_form")
        .with_user("user-1")
        .with_error_type(ErrorType::Validation);

    // Act
    let first = system
        .integration
        .handle_agent_error(anyhow!("email is required"), &first_context)
        .await;
    let second = system
        .integration
        .handle_agent_error(
            anyhow!("email is required"),
            &first_context.clone().with_retry_attempt(1),
        )
        .await;

    // Assert
    assert!(first.retry_scheduled);
    assert_eq!(first.retry_in, Some(Duration::from_secs(1)));
    let classification = first.classification.unwrap();
    assert_eq!(classification.retry_strategy, RetryStrategy::Linear);
    assert_eq!(classification.max_retries, 1);

    assert!(!second.retry_scheduled);
    assert_eq!(second.retry_in, None);
    assert_eq!(system.errors.count(), 2);
}

// ============================================================================
// Alternatives
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fallback_replaces_exhausted_retries() {
    // Arrange
    let manager = RecoveryStrategyManager::with_default_strategies();
    let fallback: Arc<dyn RecoveryAlternative<Vec<String>>> =
        Arc::new(FnAlternative::new(|_error: ErrorRecord| async {
            Some(Ok::<_, anyhow::Error>(vec!["cached".to_string()]))
        }));
    manager.register_fallback(ErrorType::ToolExecution, fallback);
    let calls = AtomicU32::new(0);

    // Act
    let result = manager
        .execute_with_recovery(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<Vec<String>, _>(anyhow!("tool crashed")) }
            },
            ErrorType::ToolExecution,
            &RecoveryContext::new("search_docs"),
        )
        .await;

    // Assert
    assert_eq!(result.unwrap(), vec!["cached".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
